/**
 * MAPPING TABLE - run-list items to Nagios checks
 *
 * Loaded from `mappings.yaml` at the start of every job and read-only after.
 *
 * ```yaml
 * basic_checks:
 *   - [ping, 'check_ping!100.0,20%!500.0,60%']
 * check_groups:
 *   web: [[http, check_http], [https, check_https]]
 * ignored:
 *   recipe: [apt, ntp]
 * role:
 *   web:
 *     - group: web
 *     - [load, check_load]
 * recipe:
 *   nginx:
 *     - { service: nginx procs, command: "check_procs!nginx" }
 * ```
 *
 * Every top-level key other than `basic_checks`, `check_groups` and `ignored`
 * is a run-list item type.
 */

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("failed to read mapping file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid mapping document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{location} references unknown check group '{group}'")]
    UnknownGroup { location: String, group: String },
    #[error("check group '{0}' references itself")]
    CyclicGroup(String),
}

/// Raw (service name, command) templates, not yet substituted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckTemplate {
    pub service: String,
    pub command: String,
}

impl CheckTemplate {
    pub fn new(service: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            command: command.into(),
        }
    }
}

/// One entry of a mapping list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CheckEntry {
    Pair(String, String),
    Named { service: String, command: String },
    GroupRef { group: String },
    /// What a YAML alias of a shared list expands to.
    Nested(Vec<CheckEntry>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingTable {
    #[serde(default)]
    pub basic_checks: Vec<CheckEntry>,
    #[serde(default)]
    pub check_groups: HashMap<String, Vec<CheckEntry>>,
    #[serde(default)]
    pub ignored: HashMap<String, HashSet<String>>,
    #[serde(flatten)]
    pub by_type: HashMap<String, HashMap<String, Option<Vec<CheckEntry>>>>,
}

impl MappingTable {
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let txt = std::fs::read_to_string(path).map_err(|source| MappingError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&txt)
    }

    pub fn from_yaml_str(txt: &str) -> Result<Self, MappingError> {
        let table: MappingTable = if txt.trim().is_empty() {
            MappingTable::default()
        } else {
            serde_yaml::from_str(txt)?
        };
        table.validate()?;
        Ok(table)
    }

    /// Fails on group references that would not resolve at lookup time.
    fn validate(&self) -> Result<(), MappingError> {
        self.check_refs("basic_checks", &self.basic_checks, &mut Vec::new())?;
        for (name, entries) in &self.check_groups {
            self.check_refs(&format!("check_groups.{name}"), entries, &mut vec![name.clone()])?;
        }
        for (kind, names) in &self.by_type {
            for (name, entries) in names {
                if let Some(entries) = entries {
                    self.check_refs(&format!("{kind}.{name}"), entries, &mut Vec::new())?;
                }
            }
        }
        Ok(())
    }

    fn check_refs(
        &self,
        location: &str,
        entries: &[CheckEntry],
        stack: &mut Vec<String>,
    ) -> Result<(), MappingError> {
        for entry in entries {
            match entry {
                CheckEntry::GroupRef { group } => {
                    if stack.contains(group) {
                        return Err(MappingError::CyclicGroup(group.clone()));
                    }
                    let inner = self.check_groups.get(group).ok_or_else(|| {
                        MappingError::UnknownGroup {
                            location: location.to_string(),
                            group: group.clone(),
                        }
                    })?;
                    stack.push(group.clone());
                    self.check_refs(location, inner, stack)?;
                    stack.pop();
                }
                CheckEntry::Nested(inner) => self.check_refs(location, inner, stack)?,
                CheckEntry::Pair(..) | CheckEntry::Named { .. } => {}
            }
        }
        Ok(())
    }

    pub fn basic_checks(&self) -> Vec<CheckTemplate> {
        let mut out = Vec::new();
        self.flatten_into(&self.basic_checks, &mut out);
        out
    }

    pub fn is_ignored(&self, kind: &str, name: &str) -> bool {
        self.ignored
            .get(kind)
            .is_some_and(|names| names.contains(name))
    }

    /// Checks mapped to `kind[name]`; `None` when nothing is defined.
    pub fn checks_for(&self, kind: &str, name: &str) -> Option<Vec<CheckTemplate>> {
        let entries = self.by_type.get(kind)?.get(name)?.as_ref()?;
        let mut out = Vec::new();
        self.flatten_into(entries, &mut out);
        (!out.is_empty()).then_some(out)
    }

    fn flatten_into(&self, entries: &[CheckEntry], out: &mut Vec<CheckTemplate>) {
        for entry in entries {
            match entry {
                CheckEntry::Pair(service, command) => {
                    out.push(CheckTemplate::new(service.as_str(), command.as_str()))
                }
                CheckEntry::Named { service, command } => {
                    out.push(CheckTemplate::new(service.as_str(), command.as_str()))
                }
                // validate() guarantees the group exists and is acyclic
                CheckEntry::GroupRef { group } => {
                    if let Some(inner) = self.check_groups.get(group) {
                        self.flatten_into(inner, out);
                    }
                }
                CheckEntry::Nested(inner) => self.flatten_into(inner, out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
basic_checks:
  - [disk, check_disk]
check_groups:
  web:
    - [http, check_http]
    - [https, check_https]
ignored:
  recipe: [apt]
role:
  web:
    - group: web
    - { service: load, command: check_load }
  empty:
recipe:
  nginx:
    - [proc, check_proc nginx]
  apt:
    - [apt, check_apt]
shared:
  anchored: &pair_list
    - [a, check_a]
    - [b, check_b]
  aliased:
    - *pair_list
    - [c, check_c]
"#;

    #[test]
    fn test_lookup_and_group_refs() {
        let table = MappingTable::from_yaml_str(DOC).unwrap();
        assert_eq!(table.basic_checks(), vec![CheckTemplate::new("disk", "check_disk")]);
        assert_eq!(
            table.checks_for("role", "web").unwrap(),
            vec![
                CheckTemplate::new("http", "check_http"),
                CheckTemplate::new("https", "check_https"),
                CheckTemplate::new("load", "check_load"),
            ]
        );
        assert_eq!(
            table.checks_for("recipe", "nginx").unwrap(),
            vec![CheckTemplate::new("proc", "check_proc nginx")]
        );
    }

    #[test]
    fn test_nested_aliases_flatten() {
        let table = MappingTable::from_yaml_str(DOC).unwrap();
        let names: Vec<String> = table
            .checks_for("shared", "aliased")
            .unwrap()
            .into_iter()
            .map(|c| c.service)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_misses() {
        let table = MappingTable::from_yaml_str(DOC).unwrap();
        assert!(table.checks_for("role", "empty").is_none());
        assert!(table.checks_for("role", "db").is_none());
        assert!(table.checks_for("nothing", "web").is_none());
        assert!(table.is_ignored("recipe", "apt"));
        assert!(!table.is_ignored("role", "apt"));
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let err = MappingTable::from_yaml_str("role:\n  web:\n    - group: nope\n").unwrap_err();
        assert!(matches!(err, MappingError::UnknownGroup { ref group, .. } if group == "nope"));
    }

    #[test]
    fn test_cyclic_group_is_rejected() {
        let doc = "check_groups:\n  a:\n    - group: b\n  b:\n    - group: a\n";
        assert!(matches!(
            MappingTable::from_yaml_str(doc),
            Err(MappingError::CyclicGroup(_))
        ));
    }

    #[test]
    fn test_quoted_thresholds_keep_commas() {
        let table =
            MappingTable::from_yaml_str("basic_checks:\n  - [ping, 'check_ping!100.0,20%!500.0,60%']\n").unwrap();
        assert_eq!(
            table.basic_checks(),
            vec![CheckTemplate::new("ping", "check_ping!100.0,20%!500.0,60%")]
        );
        // unquoted, the commas split the flow sequence
        assert!(MappingTable::from_yaml_str("basic_checks:\n  - [ping, check_ping!100.0,20%]\n").is_err());
    }

    #[test]
    fn test_sample_mapping_loads() {
        let table = MappingTable::from_yaml_str(include_str!("../../config/mappings.yaml")).unwrap();
        assert_eq!(table.basic_checks().len(), 3);
        assert_eq!(table.checks_for("recipe", "nginx").unwrap().len(), 3);
        assert!(table.checks_for("role", "base").is_none());
    }
}
