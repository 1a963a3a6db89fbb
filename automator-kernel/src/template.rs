//! Named-placeholder templates.
//!
//! Placeholders look like `%{node_name}`. Every template kind declares the
//! closed set of names it may use; anything else is an error, never left
//! in the output.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HOST_TEMPLATE_FILE: &str = "host.cfg.tpl";
pub const SERVICE_TEMPLATE_FILE: &str = "service.cfg.tpl";
pub const HOSTGROUP_TEMPLATE_FILE: &str = "hostgroup.cfg.tpl";

const BUILTIN_HOST: &str = include_str!("../templates/host.cfg.tpl");
const BUILTIN_SERVICE: &str = include_str!("../templates/service.cfg.tpl");
const BUILTIN_HOSTGROUP: &str = include_str!("../templates/hostgroup.cfg.tpl");

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template '{template}' uses undeclared placeholder %{{{name}}}")]
    UnknownPlaceholder { template: String, name: String },
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Values a template is allowed to reference.
#[derive(Debug, Clone, Default)]
pub struct Vars<'a> {
    entries: Vec<(&'static str, Cow<'a, str>)>,
}

impl<'a> Vars<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl Into<Cow<'a, str>>) -> Self {
        self.entries.push((name, value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_ref())
    }
}

/// True when `text` contains at least one `%{...}` placeholder.
pub fn has_placeholder(text: &str) -> bool {
    text.find("%{")
        .is_some_and(|start| text[start + 2..].contains('}'))
}

/// Replaces every `%{name}` in `text` in a single pass.
///
/// Substituted values are copied verbatim and never re-scanned. A `%{`
/// without a closing brace is kept as literal text.
pub fn substitute(label: &str, text: &str, vars: &Vars<'_>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("%{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        let value = vars.get(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
            template: label.to_string(),
            name: name.to_string(),
        })?;
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Substitutes only values that actually contain a placeholder, so literal
/// `%` in check commands (`check_disk!20%!10%`) is passed through untouched.
pub fn expand<'t>(label: &str, text: &'t str, vars: &Vars<'_>) -> Result<Cow<'t, str>, TemplateError> {
    if has_placeholder(text) {
        substitute(label, text, vars).map(Cow::Owned)
    } else {
        Ok(Cow::Borrowed(text))
    }
}

/// Host, service and hostgroup templates used for one generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub host: String,
    pub service: String,
    pub hostgroup: String,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateSet {
    pub fn builtin() -> Self {
        Self {
            host: BUILTIN_HOST.to_string(),
            service: BUILTIN_SERVICE.to_string(),
            hostgroup: BUILTIN_HOSTGROUP.to_string(),
        }
    }

    /// Loads templates from `dir`; any file not present keeps the built-in one.
    pub fn load(dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut set = Self::builtin();
        let Some(dir) = dir else {
            return Ok(set);
        };

        for (file, slot) in [
            (HOST_TEMPLATE_FILE, &mut set.host),
            (SERVICE_TEMPLATE_FILE, &mut set.service),
            (HOSTGROUP_TEMPLATE_FILE, &mut set.hostgroup),
        ] {
            let path = dir.join(file);
            if !path.exists() {
                continue;
            }
            *slot = std::fs::read_to_string(&path).map_err(|source| TemplateError::Read {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "loaded template override");
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vars<'static> {
        Vars::new().with("node_name", "web01").with("contact", "acme")
    }

    #[test]
    fn test_literal_passthrough() {
        let cmd = "check_disk!20%!10%";
        let out = expand("check", cmd, &vars()).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, cmd);
    }

    #[test]
    fn test_substitution_removes_placeholders() {
        let out = expand("check", "check_http!%{node_name}.example.com!5%", &vars()).unwrap();
        assert_eq!(out, "check_http!web01.example.com!5%");
        assert!(!has_placeholder(&out));
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        let err = substitute("host", "address %{local_ipv4}", &vars()).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnknownPlaceholder { ref template, ref name }
                if template == "host" && name == "local_ipv4"
        ));
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let vars = Vars::new().with("service_command", "%{node_name}");
        assert_eq!(
            substitute("service", "cmd %{service_command}", &vars).unwrap(),
            "cmd %{node_name}"
        );
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        assert!(!has_placeholder("50%{"));
        assert_eq!(substitute("x", "a %{b", &vars()).unwrap(), "a %{b");
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_override_keeps_io_source() {
        use std::error::Error;

        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be cannot be read as text
        std::fs::create_dir(dir.path().join(SERVICE_TEMPLATE_FILE)).unwrap();
        let err = TemplateSet::load(Some(dir.path())).unwrap_err();
        match &err {
            TemplateError::Read { path, .. } => assert_eq!(path, &dir.path().join(SERVICE_TEMPLATE_FILE)),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(err.source().is_some_and(|s| s.is::<std::io::Error>()));
    }

    #[test]
    fn test_load_overrides_single_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(HOSTGROUP_TEMPLATE_FILE), "group %{group_name}\n").unwrap();
        let set = TemplateSet::load(Some(dir.path())).unwrap();
        assert_eq!(set.hostgroup, "group %{group_name}\n");
        assert_eq!(set.host, TemplateSet::builtin().host);
    }
}
