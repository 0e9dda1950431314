//! Shared persistence utilities: atomic JSON writes and corrupt-file quarantine.
//!
//! Writers never expose a half-written file to readers: data goes to a hidden
//! `.tmp` sibling, is flushed to disk, then renamed over the target.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix appended to a file that could not be parsed.
pub const QUARANTINE_SUFFIX: &str = ".corrupt";

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON and hands it to [`atomic_write`].
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist, and an `InvalidData` error
/// when the content is not valid JSON for `T`.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Move an unreadable file aside so a fresh one can take its place.
///
/// The file is renamed to `<name>.corrupt`, replacing any earlier quarantined
/// copy. Returns the quarantine path.
pub fn quarantine(path: &Path) -> io::Result<PathBuf> {
    let target = quarantine_path(path);
    fs::rename(path, &target)?;
    Ok(target)
}

/// Where [`quarantine`] moves `path`.
pub fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(QUARANTINE_SUFFIX);
    PathBuf::from(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        topic: String,
        count: u32,
    }

    #[test]
    fn test_atomic_write_json_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let data = vec![Entry {
            topic: "fusion".into(),
            count: 2,
        }];

        atomic_write_json(&path, &data).unwrap();
        let loaded: Option<Vec<Entry>> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("history.json");

        atomic_write(&path, b"[]").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_atomic_write_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clean.json");

        atomic_write_json(&path, &"test").unwrap();
        assert!(!tmp_path(&path).exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_json_nonexistent() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Entry> = load_json(&dir.path().join("missing.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_json_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();

        let err = load_json::<Entry>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_quarantine_renames_with_suffix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "garbage").unwrap();

        let moved = quarantine(&path).unwrap();
        assert_eq!(moved, dir.path().join("history.json.corrupt"));
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(&moved).unwrap(), "garbage");
    }
}
