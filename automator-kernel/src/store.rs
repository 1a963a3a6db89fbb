/**
 * ARTIFACT STORE - on-disk lifecycle of generated Nagios configs
 *
 * Layout under the output root:
 *   <output_dir>/<node_name>.cfg            one per registered node
 *   <output_dir>/hostgroups/<group>.cfg     one per known group
 *
 * Host files obey the overwrite policy; hostgroup files are rewritten on
 * every registration. Every write replaces the whole file through a
 * temporary file renamed over the target.
 */

use crate::context::{ensure_file_stem, ContextError};
use crate::render::HostgroupArtifact;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const ARTIFACT_EXTENSION: &str = "cfg";
pub const HOSTGROUPS_DIR: &str = "hostgroups";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not configured to overwrite; refusing to overwrite existing config at {0}")]
    RefusingOverwrite(PathBuf),
    #[error("can't delete nonexistent config at {0}")]
    MissingArtifact(PathBuf),
    #[error(transparent)]
    InvalidName(#[from] ContextError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What an unregister actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Deleted(PathBuf),
    /// Nothing on disk and the store tolerates that.
    AlreadyAbsent(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_root: PathBuf,
    allow_overwrites: bool,
    missing_ok: bool,
}

impl ArtifactStore {
    pub fn new(output_root: impl Into<PathBuf>, allow_overwrites: bool) -> Self {
        Self {
            output_root: output_root.into(),
            allow_overwrites,
            missing_ok: false,
        }
    }

    /// Makes unregister of an unknown node a warning instead of an error.
    pub fn with_missing_ok(mut self, missing_ok: bool) -> Self {
        self.missing_ok = missing_ok;
        self
    }

    pub fn host_path(&self, node_name: &str) -> PathBuf {
        self.output_root
            .join(format!("{node_name}.{ARTIFACT_EXTENSION}"))
    }

    pub fn hostgroup_path(&self, group: &str) -> PathBuf {
        self.output_root
            .join(HOSTGROUPS_DIR)
            .join(format!("{group}.{ARTIFACT_EXTENSION}"))
    }

    /// Fails when the node config exists and overwrites are off. Callers
    /// check this before writing anything else for the node.
    pub fn ensure_host_writable(&self, node_name: &str) -> Result<PathBuf, StoreError> {
        ensure_file_stem("node_name", node_name)?;
        let path = self.host_path(node_name);
        if path.exists() {
            warn!(path = %path.display(), "config file already exists");
            if !self.allow_overwrites {
                return Err(StoreError::RefusingOverwrite(path));
            }
        }
        Ok(path)
    }

    /// Writes the node config, honouring the overwrite policy.
    ///
    /// On refusal the existing file is left exactly as it was.
    pub fn write_host(&self, node_name: &str, config: &str) -> Result<PathBuf, StoreError> {
        let path = self.ensure_host_writable(node_name)?;
        ensure_dir(&self.output_root, "output")?;

        replace_file(&path, config)?;
        debug!(path = %path.display(), "wrote host config");
        Ok(path)
    }

    pub fn write_hostgroups(&self, hostgroups: &[HostgroupArtifact]) -> Result<Vec<PathBuf>, StoreError> {
        debug!(count = hostgroups.len(), "writing hostgroup configs");
        let mut written = Vec::with_capacity(hostgroups.len());
        for artifact in hostgroups {
            ensure_file_stem("hostgroup", &artifact.group)?;
            let path = self.hostgroup_path(&artifact.group);
            if let Some(dir) = path.parent() {
                ensure_dir(dir, "hostgroup")?;
            }
            replace_file(&path, &artifact.config)?;
            debug!(path = %path.display(), "wrote hostgroup config");
            written.push(path);
        }
        Ok(written)
    }

    pub fn remove_host(&self, node_name: &str) -> Result<Removal, StoreError> {
        ensure_file_stem("node_name", node_name)?;
        let path = self.host_path(node_name);

        if !path.exists() {
            if self.missing_ok {
                warn!(node = %node_name, path = %path.display(), "no config to remove");
                return Ok(Removal::AlreadyAbsent(path));
            }
            return Err(StoreError::MissingArtifact(path));
        }

        std::fs::remove_file(&path).map_err(io_err(&path))?;
        debug!(path = %path.display(), "deleted host config");
        Ok(Removal::Deleted(path))
    }
}

fn ensure_dir(dir: &Path, what: &str) -> Result<(), StoreError> {
    if !dir.is_dir() {
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;
        info!(path = %dir.display(), "created {what} directory");
    }
    Ok(())
}

/// Whole-file replace: full content goes to a sibling temp file first.
fn replace_file(path: &Path, content: &str) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    // temp files start out 0600; the monitoring daemon runs as another user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(io_err(path))?;
    }
    tmp.write_all(content.as_bytes()).map_err(io_err(path))?;
    if !content.ends_with('\n') {
        tmp.write_all(b"\n").map_err(io_err(path))?;
    }
    tmp.persist(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
