use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::foundation::error::{VestureError, VestureResult};

/// Unpack a zip archive into `dest`, replacing whatever was there.
///
/// Entries whose names would escape `dest` fail the whole extraction. Returns the files written.
#[tracing::instrument(skip_all, fields(archive = %archive.display()))]
pub fn extract_zip(archive: &Path, dest: &Path) -> VestureResult<Vec<PathBuf>> {
    let corrupt = |e: &dyn std::fmt::Display| {
        VestureError::asset(format!("corrupt archive '{}': {e}", archive.display()))
    };

    let f = File::open(archive)
        .map_err(|e| VestureError::asset(format!("open '{}': {e}", archive.display())))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(f)).map_err(|e| corrupt(&e))?;

    if dest.exists() {
        std::fs::remove_dir_all(dest)
            .map_err(|e| VestureError::asset(format!("clear '{}': {e}", dest.display())))?;
    }
    std::fs::create_dir_all(dest)
        .map_err(|e| VestureError::asset(format!("create '{}': {e}", dest.display())))?;

    let mut written = Vec::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(|e| corrupt(&e))?;
        let Some(rel) = file.enclosed_name() else {
            return Err(VestureError::asset(format!(
                "archive '{}' entry '{}' escapes the extraction directory",
                archive.display(),
                file.name()
            )));
        };
        let out = dest.join(rel);
        if file.is_dir() {
            std::fs::create_dir_all(&out)
                .map_err(|e| VestureError::asset(format!("create '{}': {e}", out.display())))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VestureError::asset(format!("create '{}': {e}", parent.display()))
            })?;
        }
        let mut target = File::create(&out)
            .map_err(|e| VestureError::asset(format!("create '{}': {e}", out.display())))?;
        std::io::copy(&mut file, &mut target).map_err(|e| corrupt(&e))?;
        written.push(out);
    }
    tracing::debug!(files = written.len(), "archive extracted");
    Ok(written)
}

#[cfg(test)]
#[path = "../../tests/unit/assets/extract.rs"]
mod tests;
