//! Process configuration.
//!
//! Loaded once in `main` from `automator.yaml` (or `$NAGIOS_AUTOMATOR_CONFIG`)
//! and handed to the runner, queue and intake surfaces behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

pub const CONFIG_ENV: &str = "NAGIOS_AUTOMATOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "automator.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomatorConfig {
    pub output_dir: PathBuf,
    pub allow_overwrites: bool,
    pub unregister_missing_ok: bool,
    pub default_client: String,
    pub default_hostgroup: String,
    pub mapping_file: PathBuf,
    pub templates_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub daemon: DaemonConf,
    pub queue: QueueConf,
    pub http: HttpConf,
    pub mqtt: Option<MqttConf>,
}

/// Commands used to drive the monitoring daemon on one platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformCommands {
    pub start: String,
    pub stop: String,
    pub restart: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConf {
    /// Overrides platform detection when set (ex: "ubuntu").
    pub platform: Option<String>,
    pub commands: HashMap<String, PlatformCommands>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConf {
    pub workers: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    #[serde(default = "default_register_topic")]
    pub register_topic: String,
    #[serde(default = "default_unregister_topic")]
    pub unregister_topic: String,
}

fn default_mqtt_client_id() -> String {
    "nagios-automator".into()
}

fn default_register_topic() -> String {
    "nagios/register@v1".into()
}

fn default_unregister_topic() -> String {
    "nagios/unregister@v1".into()
}

impl Default for AutomatorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/etc/nagios3/conf.d/automator"),
            allow_overwrites: false,
            unregister_missing_ok: false,
            default_client: "admins".into(),
            default_hostgroup: "ungrouped".into(),
            mapping_file: PathBuf::from("config/mappings.yaml"),
            templates_dir: None,
            log_level: "info".into(),
            log_file: None,
            daemon: DaemonConf::default(),
            queue: QueueConf::default(),
            http: HttpConf::default(),
            mqtt: None,
        }
    }
}

impl Default for DaemonConf {
    fn default() -> Self {
        let mut commands = HashMap::new();
        commands.insert(
            "ubuntu".to_string(),
            PlatformCommands {
                start: "service nagios3 start".into(),
                stop: "service nagios3 stop".into(),
                restart: "service nagios3 restart".into(),
            },
        );
        Self { platform: None, commands }
    }
}

impl Default for QueueConf {
    fn default() -> Self {
        Self { workers: 4, capacity: 256 }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into(), api_key: None }
    }
}

impl AutomatorConfig {
    pub fn from_yaml_str(txt: &str) -> Result<Self, serde_yaml::Error> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(txt)
    }
}

pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub async fn load_config() -> Result<AutomatorConfig, ConfigError> {
    load_config_from(&config_path()).await
}

pub async fn load_config_from(path: &Path) -> Result<AutomatorConfig, ConfigError> {
    if !path.exists() {
        warn!(path = %path.display(), "no config file, using defaults");
        return Ok(AutomatorConfig::default());
    }

    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    AutomatorConfig::from_yaml_str(&txt).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
