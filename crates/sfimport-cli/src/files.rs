//! Reading catalog files from disk.

use std::path::Path;

use anyhow::Context;
use sfimport_core::FileType;

/// Resolves the format of `path`: the explicit override wins, otherwise the
/// extension decides.
pub(crate) fn resolve_file_type(
    path: &Path,
    explicit: Option<FileType>,
) -> anyhow::Result<FileType> {
    if let Some(file_type) = explicit {
        return Ok(file_type);
    }
    let name = file_name(path);
    FileType::from_file_name(&name).ok_or_else(|| {
        anyhow::anyhow!("cannot infer the format of '{name}'; pass --type csv|xml|zip")
    })
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Reads the whole file and resolves its format.
pub(crate) fn read_catalog(
    path: &Path,
    explicit: Option<FileType>,
) -> anyhow::Result<(FileType, Vec<u8>)> {
    let file_type = resolve_file_type(path, explicit)?;
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    tracing::debug!(path = %path.display(), %file_type, bytes = bytes.len(), "catalog file read");
    Ok((file_type, bytes))
}
