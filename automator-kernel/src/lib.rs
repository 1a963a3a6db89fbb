//! Nagios automation kernel: turns node registrations into Nagios host,
//! service and hostgroup configs and reloads the daemon.

pub mod config;
pub mod context;
pub mod daemon;
pub mod health;
pub mod http;
pub mod locks;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod mqtt;
pub mod queue;
pub mod render;
pub mod resolver;
pub mod runner;
pub mod store;
pub mod tags;
pub mod template;

pub use config::AutomatorConfig;
pub use daemon::{DaemonCommand, DaemonControl, NagiosController};
pub use runner::{ErrorKind, JobError, JobOutcome, Runner};
