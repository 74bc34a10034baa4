//! Atomic file replacement shared by the store and every state file.

use crate::error::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Replace `path` with `contents` so readers never observe a partial file.
///
/// The data goes to a temp file in the destination directory, is synced,
/// then renamed over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::file_io("write", path)(io::Error::other("path has no parent")))?;

    let mut temp_file =
        tempfile::NamedTempFile::new_in(dir).map_err(Error::file_io("create temp file in", dir))?;

    temp_file
        .write_all(contents)
        .map_err(Error::file_io("write", temp_file.path().to_path_buf()))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(Error::file_io("sync", temp_file.path().to_path_buf()))?;

    temp_file
        .persist(path)
        .map_err(|e| Error::file_io("rename into", path)(e.error))?;

    Ok(())
}

/// Read a UTF-8 file, returning `None` if it does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::file_io("read", path)(e)),
    }
}
