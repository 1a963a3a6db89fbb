//! Node tag parsing.
//!
//! Chef tags carry `key:value` pairs. Only `client` (alert contact) and
//! `hostgroup` (group override) mean anything to us.

use crate::context::HostgroupOverride;
use tracing::{debug, warn};

pub const CLIENT_TAG: &str = "client";
pub const HOSTGROUP_TAG: &str = "hostgroup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTags {
    pub client: String,
    pub hostgroup: HostgroupOverride,
}

/// Splits each tag on its first `:`; later tags win on repeated keys.
///
/// Tags without a colon and unrecognised keys are dropped. A missing or empty
/// `client` falls back to `default_client`; a missing `hostgroup` means the
/// groups are derived from the run list.
pub fn parse_tags<S: AsRef<str>>(tags: &[S], default_client: &str) -> NodeTags {
    debug!(count = tags.len(), "parsing node tags");

    let mut client: Option<String> = None;
    let mut hostgroup: Option<String> = None;

    for tag in tags {
        let tag = tag.as_ref();
        let Some((key, value)) = tag.split_once(':') else {
            debug!(tag, "ignoring tag");
            continue;
        };
        match key {
            CLIENT_TAG => client = Some(value.to_string()),
            HOSTGROUP_TAG => hostgroup = Some(value.to_string()),
            _ => debug!(tag, "ignoring unrecognised tag key"),
        }
    }

    let client = match client.filter(|c| !c.is_empty()) {
        Some(c) => c,
        None => {
            warn!(default = %default_client, "no client tag found, using default contact");
            default_client.to_string()
        }
    };

    let hostgroup = match hostgroup.filter(|h| !h.is_empty()) {
        Some(h) => HostgroupOverride::Explicit(h),
        None => {
            debug!("no hostgroup override, deriving from run list");
            HostgroupOverride::Derive
        }
    };

    NodeTags { client, hostgroup }
}
