use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn staging_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("gacha-state");
    let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    destination.with_file_name(format!(".{stem}.{}-{sequence}.partial", std::process::id()))
}

/// Replaces `path` with `content` through a synced sibling file and a rename.
///
/// Missing parent directories are created. The staging file is removed again when the
/// rename fails.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() || path.file_name().is_none() {
        bail!("state file path '{}' has no file name", path.display());
    }
    if path.is_dir() {
        bail!("state file path '{}' is a directory", path.display());
    }
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create state dir {}", parent.display()))?;
    }

    let staging = staging_path(path);
    let mut file = File::create(&staging)
        .with_context(|| format!("failed to create staging file {}", staging.display()))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to write staging file {}", staging.display()))?;
    drop(file);

    if let Err(error) = std::fs::rename(&staging, path) {
        let _ = std::fs::remove_file(&staging);
        return Err(error).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                staging.display(),
                path.display()
            )
        });
    }
    Ok(())
}
