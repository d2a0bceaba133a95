use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::StorageError;

/// Zip every file under `source_dir` into `archive_path`.
///
/// Files listed in `exclude` are skipped, as is the archive itself when it
/// lives inside `source_dir`. Entry names are relative to `source_dir` with
/// `/` separators. Returns the number of files archived.
pub fn build_archive(
    source_dir: &Path,
    archive_path: &Path,
    exclude: &[PathBuf],
) -> Result<usize, StorageError> {
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| StorageError::Archive(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path == archive_path || exclude.iter().any(|x| x == path) {
            debug!(path = %path.display(), "Leaving file out of archive");
            continue;
        }

        let relative = path
            .strip_prefix(source_dir)
            .map_err(|e| StorageError::Archive(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options)
            .map_err(|e| StorageError::Archive(e.to_string()))?;
        let mut input = File::open(path)?;
        io::copy(&mut input, &mut zip)?;
        count += 1;
    }

    zip.finish()
        .map_err(|e| StorageError::Archive(e.to_string()))?;

    info!(archive = %archive_path.display(), files = count, "Built output archive");
    Ok(count)
}
