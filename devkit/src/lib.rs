/*!
# Automator DevKit - fixtures for lifecycle tests

- Payload builders shaped like what the Chef handler posts
- A throwaway workspace with a mapping file, template dir and output root
*/

pub mod payloads;
pub mod workspace;

pub use payloads::{unregister_payload, RegisterBuilder};
pub use workspace::{TestWorkspace, SCENARIO_MAPPING};
