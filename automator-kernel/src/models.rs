//! Job payloads as posted by the Chef handler.
//!
//! Every field is optional at this level; the context builder decides what
//! is missing and names it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePayload {
    pub node_name: Option<String>,
    pub local_ipv4: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `{ node: { node_name, local_ipv4, tags }, run_list }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterPayload {
    #[serde(default)]
    pub node: NodePayload,
    pub run_list: Option<Vec<String>>,
}

/// `{ node_name }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnregisterPayload {
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Register,
    Unregister,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown or missing action: {0:?}")]
pub struct UnknownAction(pub String);

impl FromStr for JobAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register" => Ok(JobAction::Register),
            "unregister" => Ok(JobAction::Unregister),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobAction::Register => f.write_str("register"),
            JobAction::Unregister => f.write_str("unregister"),
        }
    }
}

/// One queued unit of work. `action` stays a raw string until the runner
/// picks the job up, so unknown actions fail inside the job like any other
/// configuration error.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub action: String,
    pub data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

impl Job {
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            data,
            received_at: OffsetDateTime::now_utc(),
        }
    }
}
