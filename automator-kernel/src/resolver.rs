//! Check resolution: run list + mapping table -> deduplicated checks.
//!
//! Misses are never fatal. Unparseable items and unmapped items are logged
//! and skipped, ignored items are skipped quietly.

use crate::context::GenerationContext;
use crate::mapping::{CheckTemplate, MappingTable};
use crate::template::{expand, TemplateError, Vars};
use indexmap::IndexSet;
use tracing::{debug, warn};

/// A parsed `type[name]` run-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunListItem<'a> {
    pub kind: &'a str,
    pub name: &'a str,
}

impl<'a> RunListItem<'a> {
    /// Parses `type[name]`. For recipes a trailing `::default` is dropped, so
    /// `recipe[nginx::default]` and `recipe[nginx]` are the same item.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let body = raw.trim().strip_suffix(']')?;
        let (kind, name) = body.split_once('[')?;

        if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        if name.contains(['[', ']']) {
            return None;
        }

        let name = if kind == "recipe" {
            name.strip_suffix("::default").unwrap_or(name)
        } else {
            name
        };
        if name.is_empty() {
            return None;
        }
        Some(Self { kind, name })
    }
}

/// One (service, command) pair after placeholder substitution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedCheck {
    pub service_name: String,
    pub service_command: String,
}

impl ResolvedCheck {
    pub fn new(service_name: impl Into<String>, service_command: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_command: service_command.into(),
        }
    }
}

/// Insertion-ordered, so rendering is deterministic for a given input.
pub type ResolvedChecks = IndexSet<ResolvedCheck>;

/// Placeholders check templates may use.
pub fn check_vars(ctx: &GenerationContext) -> Vars<'_> {
    Vars::new()
        .with("node_name", ctx.node_name.as_str())
        .with("local_ipv4", ctx.local_ipv4.as_str())
        .with("contact", ctx.contact.as_str())
        .with("node_groups", ctx.node_groups.join(","))
}

pub fn resolve_checks(
    ctx: &GenerationContext,
    mapping: &MappingTable,
) -> Result<ResolvedChecks, TemplateError> {
    let vars = check_vars(ctx);
    let mut checks = ResolvedChecks::new();

    for check in mapping.basic_checks() {
        checks.insert(resolve_one(&check, &vars)?);
    }

    for raw in &ctx.run_list {
        let Some(item) = RunListItem::parse(raw) else {
            warn!(node = %ctx.node_name, item = %raw, "unparseable run list item, skipping");
            continue;
        };

        if mapping.is_ignored(item.kind, item.name) {
            debug!(node = %ctx.node_name, item = %raw, "ignored run list item");
            continue;
        }

        let Some(templates) = mapping.checks_for(item.kind, item.name) else {
            warn!(node = %ctx.node_name, item = %raw, "no checks defined for {raw}");
            continue;
        };

        for check in &templates {
            checks.insert(resolve_one(check, &vars)?);
        }
    }

    debug!(node = %ctx.node_name, count = checks.len(), "resolved checks");
    Ok(checks)
}

fn resolve_one(check: &CheckTemplate, vars: &Vars<'_>) -> Result<ResolvedCheck, TemplateError> {
    Ok(ResolvedCheck {
        service_name: expand("service_name", &check.service, vars)?.into_owned(),
        service_command: expand("service_command", &check.command, vars)?.into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostgroupOverride;

    const MAPPING: &str = r#"
basic_checks:
  - [disk, check_disk]
ignored:
  recipe: [apt]
role:
  web:
    - [http, check_http]
recipe:
  nginx:
    - [proc, check_proc nginx]
  apt:
    - [apt, check_apt]
  vhost:
    - ["http %{node_name}", "check_http!%{local_ipv4}"]
    - [http, check_http]
"#;

    fn ctx(run_list: &[&str]) -> GenerationContext {
        GenerationContext {
            node_name: "web01".into(),
            local_ipv4: "10.0.0.5".into(),
            contact: "acme".into(),
            hostgroup_override: HostgroupOverride::Derive,
            run_list: run_list.iter().map(|s| s.to_string()).collect(),
            node_groups: vec!["web".into()],
        }
    }

    fn table() -> MappingTable {
        MappingTable::from_yaml_str(MAPPING).unwrap()
    }

    #[test]
    fn test_parse_items() {
        assert_eq!(
            RunListItem::parse("recipe[nginx::default]"),
            Some(RunListItem { kind: "recipe", name: "nginx" })
        );
        assert_eq!(
            RunListItem::parse("role[base::default]"),
            Some(RunListItem { kind: "role", name: "base::default" })
        );
        assert_eq!(
            RunListItem::parse("recipe[apache2::mod_ssl]"),
            Some(RunListItem { kind: "recipe", name: "apache2::mod_ssl" })
        );
        assert_eq!(RunListItem::parse("nginx"), None);
        assert_eq!(RunListItem::parse("recipe[]"), None);
        assert_eq!(RunListItem::parse("[nginx]"), None);
        assert_eq!(RunListItem::parse("recipe[::default]"), None);
        assert_eq!(RunListItem::parse("recipe[a]b]"), None);
    }

    #[test]
    fn test_scenario_role_and_default_recipe() {
        let checks = resolve_checks(&ctx(&["role[web]", "recipe[nginx::default]"]), &table()).unwrap();
        let expected: ResolvedChecks = [
            ResolvedCheck::new("disk", "check_disk"),
            ResolvedCheck::new("http", "check_http"),
            ResolvedCheck::new("proc", "check_proc nginx"),
        ]
        .into_iter()
        .collect();
        assert_eq!(checks, expected);
    }

    #[test]
    fn test_only_unparseable_items_yield_basic_checks() {
        let checks = resolve_checks(&ctx(&["garbage", "role[]", "x[y"]), &table()).unwrap();
        assert_eq!(checks.len(), 1);
        assert!(checks.contains(&ResolvedCheck::new("disk", "check_disk")));
    }

    #[test]
    fn test_ignored_items_contribute_nothing() {
        let checks = resolve_checks(&ctx(&["recipe[apt]"]), &table()).unwrap();
        assert!(!checks.iter().any(|c| c.service_name == "apt"));
    }

    #[test]
    fn test_unmapped_items_are_skipped() {
        let checks = resolve_checks(&ctx(&["recipe[unknown]", "cookbook[x]"]), &table()).unwrap();
        assert_eq!(checks.len(), 1);
    }

    #[test]
    fn test_duplicates_collapse_and_templates_substitute() {
        let checks =
            resolve_checks(&ctx(&["role[web]", "recipe[vhost]", "role[web]"]), &table()).unwrap();
        let listed: Vec<_> = checks.iter().cloned().collect();
        assert_eq!(
            listed,
            vec![
                ResolvedCheck::new("disk", "check_disk"),
                ResolvedCheck::new("http", "check_http"),
                ResolvedCheck::new("http web01", "check_http!10.0.0.5"),
            ]
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let c = ctx(&["role[web]", "recipe[nginx]", "recipe[vhost]"]);
        let t = table();
        assert_eq!(resolve_checks(&c, &t).unwrap(), resolve_checks(&c, &t).unwrap());
    }

    #[test]
    fn test_unknown_placeholder_in_check_fails() {
        let t = MappingTable::from_yaml_str("recipe:\n  x:\n    - [x, \"check!%{secret}\"]\n").unwrap();
        assert!(resolve_checks(&ctx(&["recipe[x]"]), &t).is_err());
    }
}
