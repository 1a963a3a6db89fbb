//! Generation context: the fixed-shape record every generation run works from.
//!
//! Built from the raw registration fields. Required fields are checked before
//! anything touches the disk, and group membership is derived here.

use crate::resolver::RunListItem;
use tracing::{debug, warn};

/// Where the node's hostgroups come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostgroupOverride {
    /// Collect `role[...]` entries of the run list.
    Derive,
    Explicit(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field} {value:?}: must be a plain file name")]
    InvalidName { field: &'static str, value: String },
}

/// Raw registration fields as they come off a job, all optional.
#[derive(Debug, Clone, Default)]
pub struct RegistrationInput {
    pub node_name: Option<String>,
    pub local_ipv4: Option<String>,
    pub contact: Option<String>,
    pub hostgroup_override: Option<HostgroupOverride>,
    pub run_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationContext {
    pub node_name: String,
    pub local_ipv4: String,
    pub contact: String,
    pub hostgroup_override: HostgroupOverride,
    pub run_list: Vec<String>,
    pub node_groups: Vec<String>,
}

impl GenerationContext {
    /// Validates `input` and derives `node_groups`.
    ///
    /// `default_hostgroup` is used when derivation finds no `role[...]` item.
    pub fn build(input: RegistrationInput, default_hostgroup: &str) -> Result<Self, ContextError> {
        let node_name = required(input.node_name, "node_name")?;
        let local_ipv4 = required(input.local_ipv4, "local_ipv4")?;
        let contact = required(input.contact, "contact")?;
        let hostgroup_override = input
            .hostgroup_override
            .ok_or(ContextError::MissingField("hostgroup_override"))?;
        let run_list = input.run_list.ok_or(ContextError::MissingField("run_list"))?;

        ensure_file_stem("node_name", &node_name)?;

        let run_list: Vec<String> = run_list
            .iter()
            .map(|item| item.trim().to_lowercase())
            .collect();
        if run_list.is_empty() {
            warn!(node = %node_name, "empty run list, only basic checks will apply");
        }

        let node_groups = derive_groups(&hostgroup_override, &run_list, default_hostgroup);
        for group in &node_groups {
            ensure_file_stem("hostgroup", group)?;
        }
        debug!(node = %node_name, groups = ?node_groups, "built generation context");

        Ok(Self {
            node_name,
            local_ipv4,
            contact,
            hostgroup_override,
            run_list,
            node_groups,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ContextError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ContextError::MissingField(field)),
    }
}

/// Names end up as `<name>.cfg` under the output root.
pub fn ensure_file_stem(field: &'static str, value: &str) -> Result<(), ContextError> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if bad {
        return Err(ContextError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Resolves group membership for a node.
///
/// An explicit override wins outright. Otherwise every `role[<name>]` of the
/// run list contributes `<name>` once, in discovery order, and an empty result
/// falls back to `default_group`.
pub fn derive_groups(
    hostgroup_override: &HostgroupOverride,
    run_list: &[String],
    default_group: &str,
) -> Vec<String> {
    if let HostgroupOverride::Explicit(group) = hostgroup_override {
        return vec![group.clone()];
    }

    let mut groups: Vec<String> = Vec::new();
    for item in run_list.iter().filter_map(|raw| RunListItem::parse(raw)) {
        if item.kind == "role" && !groups.iter().any(|g| g == item.name) {
            groups.push(item.name.to_string());
        }
    }

    if groups.is_empty() {
        warn!(default = %default_group, "no role found in run list, using default hostgroup");
        groups.push(default_group.to_string());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> RegistrationInput {
        RegistrationInput {
            node_name: Some("web01".into()),
            local_ipv4: Some("10.0.0.5".into()),
            contact: Some("acme".into()),
            hostgroup_override: Some(HostgroupOverride::Derive),
            run_list: Some(vec!["role[web]".into(), "recipe[nginx::default]".into()]),
        }
    }

    #[test]
    fn test_derives_groups_from_roles() {
        let ctx = GenerationContext::build(input(), "ungrouped").unwrap();
        assert_eq!(ctx.node_groups, vec!["web"]);
        assert_eq!(ctx.run_list.len(), 2);
    }

    #[test]
    fn test_derivation_follows_run_list_grammar() {
        let run_list: Vec<String> = [
            "role[web]",
            " role[db] ",
            "role[web]",
            "role[]",
            "role[a[b]]",
            "recipe[web]",
            "roleweb",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            derive_groups(&HostgroupOverride::Derive, &run_list, "ungrouped"),
            vec!["web", "db"]
        );
        assert_eq!(
            derive_groups(&HostgroupOverride::Derive, &run_list[3..], "ungrouped"),
            vec!["ungrouped"]
        );
    }

    #[test]
    fn test_explicit_override_wins() {
        let mut raw = input();
        raw.hostgroup_override = Some(HostgroupOverride::Explicit("custom".into()));
        let ctx = GenerationContext::build(raw, "ungrouped").unwrap();
        assert_eq!(ctx.node_groups, vec!["custom"]);
    }

    #[test]
    fn test_missing_fields_are_named() {
        let mut raw = input();
        raw.local_ipv4 = None;
        assert_eq!(
            GenerationContext::build(raw, "x").unwrap_err(),
            ContextError::MissingField("local_ipv4")
        );

        let mut raw = input();
        raw.node_name = Some("   ".into());
        assert_eq!(
            GenerationContext::build(raw, "x").unwrap_err(),
            ContextError::MissingField("node_name")
        );

        let mut raw = input();
        raw.run_list = None;
        assert_eq!(
            GenerationContext::build(raw, "x").unwrap_err(),
            ContextError::MissingField("run_list")
        );
    }

    #[test]
    fn test_rejects_path_like_node_name() {
        let mut raw = input();
        raw.node_name = Some("../etc/passwd".into());
        assert!(matches!(
            GenerationContext::build(raw, "x"),
            Err(ContextError::InvalidName { field: "node_name", .. })
        ));
    }

    #[test]
    fn test_run_list_is_normalised() {
        let mut raw = input();
        raw.run_list = Some(vec!["  ROLE[Web] ".into()]);
        let ctx = GenerationContext::build(raw, "x").unwrap();
        assert_eq!(ctx.run_list, vec!["role[web]"]);
        assert_eq!(ctx.node_groups, vec!["web"]);
    }

    #[test]
    fn test_derive_dedups_and_keeps_order() {
        let run_list: Vec<String> = ["role[db]", "recipe[x]", "role[web]", "role[db]"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            derive_groups(&HostgroupOverride::Derive, &run_list, "ungrouped"),
            vec!["db", "web"]
        );
    }

    #[test]
    fn test_derive_falls_back_to_default() {
        let run_list = vec!["recipe[nginx]".to_string(), "role[]".to_string()];
        assert_eq!(
            derive_groups(&HostgroupOverride::Derive, &run_list, "ungrouped"),
            vec!["ungrouped"]
        );
    }
}
