//! Checks against files already on disk.

use std::io;
use std::path::{Path, PathBuf};

use crate::utils::TEMP_SUFFIX;

/// Whether `dest` (or a sibling produced by a separate compression step)
/// already exists.
///
/// `.jpg`/`.jpeg` images count as present when a `.jxl` with the same stem
/// exists; `.mp4`/`.mkv` videos when a `<stem>_av1.mp4` exists.
pub fn is_already_satisfied(dest: &Path) -> bool {
    if dest.exists() {
        return true;
    }
    converted_sibling(dest).is_some_and(|sibling| sibling.exists())
}

fn converted_sibling(dest: &Path) -> Option<PathBuf> {
    let ext = dest.extension()?.to_str()?.to_ascii_lowercase();
    let stem = dest.file_stem()?.to_str()?;
    match ext.as_str() {
        "jpg" | "jpeg" => Some(dest.with_file_name(format!("{}.jxl", stem))),
        "mp4" | "mkv" => Some(dest.with_file_name(format!("{}_av1.mp4", stem))),
        _ => None,
    }
}

/// Remove leftover `*.downloading` files under `dir`.
///
/// Returns how many were removed. A missing directory is not an error.
pub async fn sweep_partial_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
            {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::debug!("Removed partial file {}", path.display());
                        removed += 1;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }

    if removed > 0 {
        tracing::info!("Removed {} partial downloads from {}", removed, dir.display());
    }
    Ok(removed)
}
