use std::{
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::warn;

use crate::result::{Error, Result};

/// Extension of every video file written by the pipeline
pub const VIDEO_EXTENSION: &str = "mp4";

/// A random, practically unique, file stem: 128 random bits in hex.
pub fn random_stem() -> String {
    format!("{:032x}", fastrand::u128(..))
}

/// Build a path in `dir` with a random name that does not exist yet.
///
/// Names are random enough for concurrent callers never to pick the same one.
pub fn unique_path(dir: &Path, prefix: &str, extension: &str) -> Result<PathBuf> {
    // Check filenames one by one until one does not exist
    for _ in 0..16 {
        let path = dir.join(format!("{prefix}{}.{extension}", random_stem()));
        if !path.exists() {
            return Ok(path);
        }
    }

    Err(Error::Miette(miette::miette!(
        "Could not find an unused file name in {}",
        dir.display()
    )))
}

/// Create a named temporary file in `dir` and return its handle.
///
/// The file destructor will be called at the handle drop.
/// **As such, one must not simply get the file path and drop the handle.**
/// Keeping it in `dir` lets [`NamedTempFile::persist`] be a plain rename.
pub fn named_tempfile_in(dir: &Path, extension: &str) -> Result<NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(&format!(".{extension}"))
        .tempfile_in(dir)?)
}

/// Whether the path is a regular file holding at least one byte.
pub fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

/// Remove a file, a missing file is not an error.
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != IoErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Best effort removal, used on paths that are already failing.
pub fn discard(path: &Path) {
    if let Err(err) = remove_if_exists(path) {
        warn!("Could not remove {}: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn unique_paths_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let paths: HashSet<_> = (0..1000)
            .map(|_| unique_path(dir.path(), "", VIDEO_EXTENSION).unwrap())
            .collect();
        assert_eq!(paths.len(), 1000);
        assert!(paths
            .iter()
            .all(|p| p.extension().is_some_and(|ext| ext == "mp4")));
    }

    #[test]
    fn empty_files_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        assert!(!is_non_empty_file(&path));
        fs::write(&path, b"").unwrap();
        assert!(!is_non_empty_file(&path));
        fs::write(&path, b"data").unwrap();
        assert!(is_non_empty_file(&path));
        assert!(!is_non_empty_file(dir.path()));
    }

    #[test]
    fn removing_twice_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        fs::write(&path, b"data").unwrap();
        remove_if_exists(&path).unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
