//! Transfer artifact files: temp writer, resume marker and atomic promotion.
//!
//! Transfers write to `<final>.part` with a `<final>.resume` marker holding
//! the durable byte offset. The scheduler promotes the temp with a rename
//! once the part completes, so a reader never sees a half-written file under
//! the final path. Markers and temps survive failures and are removed only
//! on successful promotion or explicit deletion.

use crate::layout;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Writer for an in-progress part transfer.
pub struct ArtifactWriter {
    file: File,
    temp_path: PathBuf,
}

impl ArtifactWriter {
    /// Creates (truncates) the temp file for `final_path`, including parent
    /// directories.
    pub fn create(final_path: &Path) -> Result<Self> {
        let temp_path = layout::temp_path(final_path);
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
        Ok(ArtifactWriter { file, temp_path })
    }

    /// Opens an existing temp file for a resumed transfer (no truncation).
    pub fn open_resume(final_path: &Path) -> Result<Self> {
        let temp_path = layout::temp_path(final_path);
        let file = File::options()
            .write(true)
            .open(&temp_path)
            .with_context(|| format!("failed to open temp file: {}", temp_path.display()))?;
        Ok(ArtifactWriter { file, temp_path })
    }

    /// Preallocates `size` bytes. On Unix tries `posix_fallocate` for real
    /// block allocation; falls back to `set_len` on failure or non-Unix.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .context("failed to preallocate temp file")?;
        Ok(())
    }

    /// Writes `data` at `offset` without moving the logical cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_all_at(data, offset)
            .with_context(|| format!("write failed at offset {offset}"))?;
        Ok(())
    }

    /// Non-Unix fallback: seek + write on a cloned handle.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone().context("failed to clone temp file handle")?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(())
    }

    /// Syncs file data to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("temp file sync failed")?;
        Ok(())
    }

    /// Path to the temp file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}

/// Promotes a completed temp file to its final path and clears the resume
/// marker. The rename is atomic within one filesystem.
pub fn promote(final_path: &Path) -> Result<()> {
    let temp = layout::temp_path(final_path);
    fs::rename(&temp, final_path).with_context(|| {
        format!(
            "failed to promote {} to {}",
            temp.display(),
            final_path.display()
        )
    })?;
    let marker = layout::resume_path(final_path);
    if let Err(err) = fs::remove_file(&marker) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %marker.display(), %err, "failed to remove resume marker");
        }
    }
    Ok(())
}

/// Reads the resume marker for `final_path`: the durable byte offset of the
/// partial transfer, or `None` when absent or unreadable.
pub fn read_resume_marker(final_path: &Path) -> Option<u64> {
    let marker = layout::resume_path(final_path);
    let data = fs::read_to_string(&marker).ok()?;
    data.trim().parse().ok()
}

/// Writes or overwrites the resume marker for `final_path`.
pub fn write_resume_marker(final_path: &Path, offset: u64) -> Result<()> {
    let marker = layout::resume_path(final_path);
    fs::write(&marker, offset.to_string())
        .with_context(|| format!("failed to write resume marker: {}", marker.display()))?;
    Ok(())
}
