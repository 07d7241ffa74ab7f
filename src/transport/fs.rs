use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::errors::SyncError;
use crate::layout::ensure_parent_dir;

/// Serialize `value` as pretty JSON and replace `path` atomically (temp file + rename).
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SyncError> {
    let raw = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &raw)
}

/// Replace `path` with `bytes` atomically.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    ensure_parent_dir(path)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read JSON from `path`, returning `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SyncError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Unpack a zip archive into `target`, staging through `staging`.
///
/// The archive is extracted into `staging` first; only a complete extraction
/// replaces `target`. Returns the number of extracted files.
pub fn unpack_archive(bytes: &[u8], target: &Path, staging: &Path) -> Result<usize, SyncError> {
    if staging.exists() {
        fs::remove_dir_all(staging)?;
    }
    fs::create_dir_all(staging)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let files = (0..archive.len())
        .filter(|idx| {
            archive
                .by_index(*idx)
                .map(|entry| entry.is_file())
                .unwrap_or(false)
        })
        .count();
    archive.extract(staging)?;
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    fs::rename(staging, target)?;
    Ok(files)
}

/// Extracted tables under `dir` whose file name ends with `<tag>_<n>.csv`, sorted.
pub fn find_tables(dir: &Path, tag: &str) -> Vec<PathBuf> {
    let mut tables: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| is_tag_table(name, tag))
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();
    tables.sort();
    tables
}

/// True for `..._<tag>_<digits>.csv` (case-insensitive extension).
fn is_tag_table(file_name: &str, tag: &str) -> bool {
    let Some(stem) = file_name
        .strip_suffix(".csv")
        .or_else(|| file_name.strip_suffix(".CSV"))
    else {
        return false;
    };
    let Some((head, part)) = stem.rsplit_once('_') else {
        return false;
    };
    !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()) && head.ends_with(tag)
}
