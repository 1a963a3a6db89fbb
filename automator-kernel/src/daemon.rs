//! Monitoring daemon control.
//!
//! Start/stop/restart map through a platform -> command table; the platform
//! is taken from config or detected from the OS distribution. Commands run
//! synchronously and a non-zero exit is an error carrying the command output.

use crate::config::{DaemonConf, PlatformCommands};
use std::collections::HashMap;
use std::fmt;
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonCommand {
    Start,
    Stop,
    Restart,
}

impl fmt::Display for DaemonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DaemonCommand::Start => "start",
            DaemonCommand::Stop => "stop",
            DaemonCommand::Restart => "restart",
        };
        f.write_str(s)
    }
}

impl PlatformCommands {
    pub fn command_for(&self, cmd: DaemonCommand) -> &str {
        match cmd {
            DaemonCommand::Start => &self.start,
            DaemonCommand::Stop => &self.stop,
            DaemonCommand::Restart => &self.restart,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("no daemon commands configured for platform '{0}'")]
    UnsupportedPlatform(String),
    #[error("invalid daemon command {command:?}: {reason}")]
    InvalidCommand { command: String, reason: String },
    #[error("failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' exited with {status}: {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },
}

/// Result of one daemon command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    pub output: String,
    pub execution_time_ms: u128,
}

/// Seam between the runner and whatever drives the monitoring daemon.
pub trait DaemonControl: Send + Sync {
    fn run(&self, cmd: DaemonCommand) -> Result<CommandOutput, DaemonError>;

    fn start(&self) -> Result<CommandOutput, DaemonError> {
        self.run(DaemonCommand::Start)
    }

    fn stop(&self) -> Result<CommandOutput, DaemonError> {
        self.run(DaemonCommand::Stop)
    }

    fn restart(&self) -> Result<CommandOutput, DaemonError> {
        self.run(DaemonCommand::Restart)
    }
}

/// Runs the configured shell commands for the Nagios service.
#[derive(Debug, Clone)]
pub struct NagiosController {
    platform: String,
    commands: HashMap<String, PlatformCommands>,
}

impl NagiosController {
    pub fn new(conf: &DaemonConf) -> Self {
        let platform = conf.platform.clone().unwrap_or_else(detect_platform);
        info!(platform = %platform, "nagios controller ready");
        Self {
            platform,
            commands: conf.commands.clone(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Command line for `cmd` on this platform.
    pub fn command_line(&self, cmd: DaemonCommand) -> Result<&str, DaemonError> {
        self.commands
            .get(&self.platform)
            .map(|c| c.command_for(cmd))
            .ok_or_else(|| DaemonError::UnsupportedPlatform(self.platform.clone()))
    }
}

impl DaemonControl for NagiosController {
    fn run(&self, cmd: DaemonCommand) -> Result<CommandOutput, DaemonError> {
        let line = self.command_line(cmd)?;
        info!(command = %line, action = %cmd, "running daemon command");
        execute(line)
    }
}

/// Distribution id as reported by the OS (ex: "ubuntu"), falling back to
/// the compile-time OS name.
pub fn detect_platform() -> String {
    let id = sysinfo::System::distribution_id();
    if id.is_empty() {
        std::env::consts::OS.to_string()
    } else {
        id.to_lowercase()
    }
}

/// Splits `line` shell-style and runs it without a shell.
pub fn execute(line: &str) -> Result<CommandOutput, DaemonError> {
    let start_time = Instant::now();
    let argv = shell_words::split(line).map_err(|e| DaemonError::InvalidCommand {
        command: line.to_string(),
        reason: e.to_string(),
    })?;
    let Some((program, args)) = argv.split_first() else {
        return Err(DaemonError::InvalidCommand {
            command: line.to_string(),
            reason: "empty command".into(),
        });
    };

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| DaemonError::Spawn {
            command: line.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{}\nSTDERR:\n{}", stdout, stderr)
    };

    if !output.status.success() {
        return Err(DaemonError::CommandFailed {
            command: line.to_string(),
            status: output.status.to_string(),
            output: combined.trim().to_string(),
        });
    }

    let execution_time_ms = start_time.elapsed().as_millis();
    debug!(command = %line, execution_time_ms, "daemon command succeeded");
    Ok(CommandOutput {
        command: line.to_string(),
        output: combined,
        execution_time_ms,
    })
}
