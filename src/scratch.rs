//! Job-scoped scratch directories with guaranteed cleanup.
//!
//! Every audio job works exclusively inside its own scratch tree so
//! concurrent requests cannot interfere. The tree is removed when the job
//! finishes, whether it succeeded or failed, and removal problems are logged rather
//! than raised, so cleanup never masks the error actually being
//! propagated.

use std::path::{Path, PathBuf};
use tracing::warn;

/// The scratch layout for one render job.
#[derive(Clone, Debug)]
pub struct JobScratch {
    root: PathBuf,
    /// Per-line synthesized clips.
    pub lines_dir: PathBuf,
    /// Concatenated and BGM-mixed tracks.
    pub mix_dir: PathBuf,
    /// HLS manifest and segments awaiting upload.
    pub segments_dir: PathBuf,
}

impl JobScratch {
    /// Create the full directory tree under `scratch_root/<job>`.
    pub async fn create(scratch_root: &Path, job: &str) -> std::io::Result<Self> {
        let root = scratch_root.join(job);
        let scratch = Self {
            lines_dir: root.join("lines"),
            mix_dir: root.join("mix"),
            segments_dir: root.join("segments"),
            root,
        };
        for dir in [&scratch.lines_dir, &scratch.mix_dir, &scratch.segments_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(scratch)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recursively remove the whole job tree. Failures are logged, never
    /// returned.
    pub async fn remove(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(root = %self.root.display(), error = %e, "failed to remove job scratch");
            }
        }
    }
}
