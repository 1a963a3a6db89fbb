use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Mapping used by the lifecycle scenarios.
pub const SCENARIO_MAPPING: &str = r#"
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
"#;

/// Temporary directory laid out like a deployment:
///
/// ```text
/// <root>/mappings.yaml
/// <root>/templates/      (empty unless templates are written)
/// <root>/out/            (created by the store on first write)
/// ```
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Self::with_mapping(SCENARIO_MAPPING)
    }

    pub fn with_mapping(mapping: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("mappings.yaml"), mapping)?;
        fs::create_dir_all(dir.path().join("templates"))?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn mapping_file(&self) -> PathBuf {
        self.root().join("mappings.yaml")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root().join("templates")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root().join("out")
    }

    pub fn host_file(&self, node_name: &str) -> PathBuf {
        self.output_dir().join(format!("{node_name}.cfg"))
    }

    pub fn hostgroup_file(&self, group: &str) -> PathBuf {
        self.output_dir().join("hostgroups").join(format!("{group}.cfg"))
    }

    pub fn write_mapping(&self, mapping: &str) -> Result<()> {
        fs::write(self.mapping_file(), mapping)?;
        Ok(())
    }

    /// Writes `<templates>/<file>`, ex: `service.cfg.tpl`.
    pub fn write_template(&self, file: &str, content: &str) -> Result<()> {
        fs::write(self.templates_dir().join(file), content)?;
        Ok(())
    }

    pub fn read_host(&self, node_name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.host_file(node_name))?)
    }
}
