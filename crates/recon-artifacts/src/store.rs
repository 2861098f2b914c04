use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::manifest::EventManifest;

/// Destination for the artifacts a run leaves behind. Each is written once, at run end.
pub trait ArtifactStore: Send + Sync {
    fn write_report(&self, markdown: &str) -> Result<PathBuf>;
    fn write_remediation(&self, markdown: &str) -> Result<PathBuf>;
    fn write_manifest(&self, manifest: &EventManifest) -> Result<PathBuf>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub report: PathBuf,
    pub remediation: PathBuf,
    pub events: PathBuf,
}

impl ArtifactPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            report: dir.join("recon_report.md"),
            remediation: dir.join("remediation.md"),
            events: dir.join("events.json"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    pub paths: ArtifactPaths,
}

impl FsArtifactStore {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self { paths }
    }

    fn write(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
        }
        std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write_report(&self, markdown: &str) -> Result<PathBuf> {
        Self::write(&self.paths.report, markdown.as_bytes())
    }

    fn write_remediation(&self, markdown: &str) -> Result<PathBuf> {
        Self::write(&self.paths.remediation, markdown.as_bytes())
    }

    fn write_manifest(&self, manifest: &EventManifest) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(manifest).context("serialize event manifest")?;
        Self::write(&self.paths.events, &bytes)
    }
}
