/**
 * RUNNER - lifecycle of one register/unregister job
 *
 * register:   received -> validated -> resolved -> rendered -> written -> reloaded
 * unregister: received -> validated -> removed -> reloaded
 *
 * Any step may fail; the job then ends in `failed` and a single fatal event
 * is logged. The mapping table and templates are re-read for every job so
 * edits apply without a restart.
 *
 * Locking: the node lock is taken just before the first mutation and held
 * through the daemon reload. Reloads are serialised process-wide.
 */

use crate::config::AutomatorConfig;
use crate::context::{ensure_file_stem, ContextError, GenerationContext, RegistrationInput};
use crate::daemon::{DaemonControl, DaemonError};
use crate::locks::{NodeLocks, ReloadLock};
use crate::mapping::{MappingError, MappingTable};
use crate::models::{JobAction, RegisterPayload, UnknownAction, UnregisterPayload};
use crate::render::Renderer;
use crate::resolver::resolve_checks;
use crate::store::{ArtifactStore, Removal, StoreError};
use crate::tags::parse_tags;
use crate::template::{TemplateError, TemplateSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Policy,
    ExternalCommand,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Policy => "policy",
            ErrorKind::ExternalCommand => "external_command",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),
    #[error("malformed job payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::UnknownAction(_)
            | JobError::InvalidPayload(_)
            | JobError::Context(_)
            | JobError::Template(TemplateError::UnknownPlaceholder { .. })
            | JobError::Mapping(
                MappingError::Parse(_)
                | MappingError::UnknownGroup { .. }
                | MappingError::CyclicGroup(_),
            )
            | JobError::Store(StoreError::InvalidName(_)) => ErrorKind::Configuration,
            JobError::Store(StoreError::RefusingOverwrite(_) | StoreError::MissingArtifact(_)) => {
                ErrorKind::Policy
            }
            JobError::Daemon(_) => ErrorKind::ExternalCommand,
            JobError::Mapping(MappingError::Read { .. })
            | JobError::Template(TemplateError::Read { .. })
            | JobError::Store(StoreError::Io { .. }) => ErrorKind::Io,
        }
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Validated,
    Resolved,
    Rendered,
    Written,
    Removed,
    Reloaded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Received => "received",
            JobState::Validated => "validated",
            JobState::Resolved => "resolved",
            JobState::Rendered => "rendered",
            JobState::Written => "written",
            JobState::Removed => "removed",
            JobState::Reloaded => "reloaded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

struct Progress<'a> {
    action: &'a str,
    state: JobState,
}

impl<'a> Progress<'a> {
    fn new(action: &'a str) -> Self {
        debug!(action, state = %JobState::Received, "job state");
        Self {
            action,
            state: JobState::Received,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug!(action = self.action, from = %self.state, to = %next, "job state");
        self.state = next;
    }
}

/// What a finished job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Registered {
        node_name: String,
        host_path: PathBuf,
        hostgroup_paths: Vec<PathBuf>,
        check_count: usize,
    },
    Unregistered {
        node_name: String,
        removal: Removal,
    },
}

impl JobOutcome {
    pub fn node_name(&self) -> &str {
        match self {
            JobOutcome::Registered { node_name, .. } | JobOutcome::Unregistered { node_name, .. } => {
                node_name
            }
        }
    }
}

pub struct Runner {
    config: Arc<AutomatorConfig>,
    daemon: Arc<dyn DaemonControl>,
    node_locks: NodeLocks,
    reload_lock: ReloadLock,
}

impl Runner {
    pub fn new(config: Arc<AutomatorConfig>, daemon: Arc<dyn DaemonControl>) -> Self {
        Self {
            config,
            daemon,
            node_locks: NodeLocks::new(),
            reload_lock: ReloadLock::new(),
        }
    }

    pub fn node_locks(&self) -> &NodeLocks {
        &self.node_locks
    }

    /// Dispatches a raw job. Failures are logged as fatal before returning.
    pub fn perform(&self, action: &str, data: &Value) -> Result<JobOutcome, JobError> {
        let result = action
            .parse::<JobAction>()
            .map_err(JobError::from)
            .and_then(|action| match action {
                JobAction::Register => self.register(data),
                JobAction::Unregister => self.unregister(data),
            });

        if let Err(e) = &result {
            error!(fatal = true, action, kind = %e.kind(), error = %e, "job failed");
        }
        result
    }

    pub fn register(&self, data: &Value) -> Result<JobOutcome, JobError> {
        let mut progress = Progress::new("register");
        let result = self.register_inner(data, &mut progress);
        if result.is_err() {
            progress.advance(JobState::Failed);
        }
        result
    }

    pub fn unregister(&self, data: &Value) -> Result<JobOutcome, JobError> {
        let mut progress = Progress::new("unregister");
        let result = self.unregister_inner(data, &mut progress);
        if result.is_err() {
            progress.advance(JobState::Failed);
        }
        result
    }

    fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.config.output_dir, self.config.allow_overwrites)
            .with_missing_ok(self.config.unregister_missing_ok)
    }

    fn register_inner(&self, data: &Value, progress: &mut Progress<'_>) -> Result<JobOutcome, JobError> {
        let payload = RegisterPayload::deserialize(data)?;
        let tags = parse_tags(&payload.node.tags, &self.config.default_client);
        let ctx = GenerationContext::build(
            RegistrationInput {
                node_name: payload.node.node_name,
                local_ipv4: payload.node.local_ipv4,
                contact: Some(tags.client),
                hostgroup_override: Some(tags.hostgroup),
                run_list: payload.run_list,
            },
            &self.config.default_hostgroup,
        )?;
        progress.advance(JobState::Validated);

        let mapping = MappingTable::load(&self.config.mapping_file)?;
        let checks = resolve_checks(&ctx, &mapping)?;
        progress.advance(JobState::Resolved);

        let templates = TemplateSet::load(self.config.templates_dir.as_deref())?;
        let artifacts = Renderer::new(&templates).render(&ctx, &checks)?;
        progress.advance(JobState::Rendered);

        let _node = self.node_locks.lock(&ctx.node_name);
        let store = self.store();
        // the host file is written only after every hostgroup file
        store.ensure_host_writable(&ctx.node_name)?;
        let hostgroup_paths = store.write_hostgroups(&artifacts.hostgroups)?;
        let host_path = store.write_host(&ctx.node_name, &artifacts.host_config)?;
        progress.advance(JobState::Written);

        self.reload()?;
        progress.advance(JobState::Reloaded);

        info!(
            node = %ctx.node_name,
            path = %host_path.display(),
            checks = artifacts.check_count,
            groups = ?ctx.node_groups,
            "Registered node"
        );
        Ok(JobOutcome::Registered {
            node_name: ctx.node_name,
            host_path,
            hostgroup_paths,
            check_count: artifacts.check_count,
        })
    }

    fn unregister_inner(&self, data: &Value, progress: &mut Progress<'_>) -> Result<JobOutcome, JobError> {
        let payload = UnregisterPayload::deserialize(data)?;
        let node_name = match payload.node_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => return Err(ContextError::MissingField("node_name").into()),
        };
        ensure_file_stem("node_name", &node_name)?;
        progress.advance(JobState::Validated);

        let _node = self.node_locks.lock(&node_name);
        let removal = self.store().remove_host(&node_name)?;
        progress.advance(JobState::Removed);

        self.reload()?;
        progress.advance(JobState::Reloaded);

        info!(node = %node_name, "Unregistered node");
        Ok(JobOutcome::Unregistered { node_name, removal })
    }

    fn reload(&self) -> Result<(), DaemonError> {
        let _reload = self.reload_lock.acquire();
        let out = self.daemon.restart()?;
        debug!(command = %out.command, execution_time_ms = out.execution_time_ms, "daemon reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::{CommandOutput, DaemonCommand};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<DaemonCommand>>,
    }

    impl DaemonControl for Recorder {
        fn run(&self, cmd: DaemonCommand) -> Result<CommandOutput, DaemonError> {
            self.calls.lock().push(cmd);
            Ok(CommandOutput {
                command: cmd.to_string(),
                output: String::new(),
                execution_time_ms: 0,
            })
        }
    }

    fn runner(dir: &std::path::Path) -> (Runner, Arc<Recorder>) {
        let mapping = dir.join("mappings.yaml");
        std::fs::write(&mapping, "basic_checks:\n  - [ping, check_ping]\nrole:\n  web:\n    - [http, check_http]\n").unwrap();
        let config = AutomatorConfig {
            output_dir: dir.join("out"),
            mapping_file: mapping,
            ..AutomatorConfig::default()
        };
        let daemon = Arc::new(Recorder::default());
        (Runner::new(Arc::new(config), daemon.clone()), daemon)
    }

    #[test]
    fn test_register_writes_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, daemon) = runner(dir.path());
        let outcome = runner
            .perform(
                "register",
                &json!({
                    "node": { "node_name": "web01", "local_ipv4": "10.0.0.5", "tags": [] },
                    "run_list": ["role[web]"]
                }),
            )
            .unwrap();

        match outcome {
            JobOutcome::Registered { check_count, hostgroup_paths, .. } => {
                assert_eq!(check_count, 2);
                assert_eq!(hostgroup_paths.len(), 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(dir.path().join("out/web01.cfg").exists());
        assert!(dir.path().join("out/hostgroups/web.cfg").exists());
        assert_eq!(*daemon.calls.lock(), vec![DaemonCommand::Restart]);
        assert_eq!(runner.node_locks().active(), 0);
    }

    #[test]
    fn test_unknown_action_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, daemon) = runner(dir.path());
        let err = runner.perform("reboot", &json!({})).unwrap_err();
        assert!(matches!(err, JobError::UnknownAction(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(daemon.calls.lock().is_empty());
    }

    #[test]
    fn test_missing_field_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, daemon) = runner(dir.path());
        let err = runner
            .register(&json!({ "node": { "node_name": "web01" }, "run_list": [] }))
            .unwrap_err();
        assert!(matches!(err, JobError::Context(ContextError::MissingField("local_ipv4"))));
        assert!(!dir.path().join("out").exists());
        assert!(daemon.calls.lock().is_empty());
    }

    #[test]
    fn test_unregister_missing_is_policy_error() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, daemon) = runner(dir.path());
        let err = runner.unregister(&json!({ "node_name": "ghost" })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert!(daemon.calls.lock().is_empty());
    }

    #[test]
    fn test_payload_of_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _) = runner(dir.path());
        let err = runner.register(&json!({ "node": "web01" })).unwrap_err();
        assert!(matches!(err, JobError::InvalidPayload(_)));
    }
}
