//! Append-only log of completed research sessions.
//!
//! The log is a single JSON array of [`SessionRecord`]s. Every append rewrites
//! the whole file atomically under an exclusive advisory lock, so concurrent
//! processes never lose entries and readers never see a half-written file.
//! An unreadable log is quarantined (renamed with the `.corrupt` suffix) and
//! treated as empty.

use crate::error::HistoryError;
use crate::persistence;
use chrono::{DateTime, Local};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One completed research session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub topic: String,
    pub report: String,
    #[serde(with = "iso_timestamp")]
    pub timestamp: DateTime<Local>,
}

impl SessionRecord {
    /// File name used when exporting this report, derived from the topic.
    pub fn suggested_file_name(&self) -> String {
        let slug: String = self
            .topic
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug
            .split('-')
            .filter(|part| !part.is_empty())
            .take(8)
            .collect::<Vec<_>>()
            .join("-");
        if slug.is_empty() {
            "report.md".to_string()
        } else {
            format!("{slug}.md")
        }
    }
}

/// Timestamps are ISO-8601 text. Older logs carry naive local times without
/// an offset; those are read as local time.
mod iso_timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Local>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(ts.with_timezone(&Local));
        }
        let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(serde::de::Error::custom)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| serde::de::Error::custom(format!("nonexistent local time: {raw}")))
    }
}

/// Durable, append-only research history.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable log gets moved.
    pub fn quarantine_path(&self) -> PathBuf {
        persistence::quarantine_path(&self.path)
    }

    /// All records in append order (oldest first).
    ///
    /// Returns an empty list when no log exists yet or when the log is
    /// unreadable; in the latter case the file is quarantined first. A
    /// missing log is reported without touching the filesystem.
    pub fn load(&self) -> Result<Vec<SessionRecord>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let _lock = self.lock()?;
        self.read_unlocked()
    }

    /// All records, most recent first.
    pub fn load_recent(&self) -> Result<Vec<SessionRecord>, HistoryError> {
        let mut records = self.load()?;
        records.reverse();
        Ok(records)
    }

    /// Record a completed session stamped with the current time.
    pub fn append(
        &self,
        topic: impl Into<String>,
        report: impl Into<String>,
    ) -> Result<SessionRecord, HistoryError> {
        let record = SessionRecord {
            topic: topic.into(),
            report: report.into(),
            timestamp: Local::now(),
        };

        let _lock = self.lock()?;
        let mut records = self.read_unlocked()?;
        records.push(record.clone());
        persistence::atomic_write_json(&self.path, &records)
            .map_err(|e| HistoryError::io(&self.path, e))?;

        info!(
            path = %self.path.display(),
            topic = %record.topic,
            total = records.len(),
            "Recorded research session"
        );
        Ok(record)
    }

    /// Write one report to a Markdown file.
    pub fn export_markdown(record: &SessionRecord, dest: &Path) -> Result<(), HistoryError> {
        persistence::atomic_write(dest, record.report.as_bytes())
            .map_err(|e| HistoryError::io(dest, e))
    }

    fn read_unlocked(&self) -> Result<Vec<SessionRecord>, HistoryError> {
        match persistence::load_json::<Vec<SessionRecord>>(&self.path) {
            Ok(Some(records)) => Ok(records),
            Ok(None) => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                match persistence::quarantine(&self.path) {
                    Ok(moved) => warn!(
                        error = %e,
                        quarantined = %moved.display(),
                        "History log unreadable, starting a fresh one"
                    ),
                    Err(rename_err) => warn!(
                        error = %e,
                        rename_error = %rename_err,
                        path = %self.path.display(),
                        "History log unreadable and could not be quarantined"
                    ),
                }
                Ok(Vec::new())
            }
            Err(e) => Err(HistoryError::io(&self.path, e)),
        }
    }

    fn lock(&self) -> Result<HistoryLock, HistoryError> {
        HistoryLock::acquire(&self.path)
    }
}

/// Exclusive advisory lock on `<log>.lock`, released on drop.
struct HistoryLock {
    file: File,
}

impl HistoryLock {
    fn acquire(path: &Path) -> Result<Self, HistoryError> {
        let mut name = path.as_os_str().to_os_string();
        name.push(".lock");
        let lock_path = PathBuf::from(name);

        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| HistoryError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| HistoryError::io(&lock_path, e))?;
        file.lock_exclusive().map_err(|e| HistoryError::Lock {
            path: lock_path.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { file })
    }
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> HistoryStore {
        HistoryStore::new(dir.path().join("history.json"))
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("never").join("created");
        let store = HistoryStore::new(parent.join("history.json"));

        assert!(store.load().unwrap().is_empty());
        assert!(store.load_recent().unwrap().is_empty());
        assert!(!parent.exists());
    }

    #[test]
    fn test_load_missing_under_uncreatable_parent_is_empty() {
        let dir = TempDir::new().unwrap();
        // A regular file where the parent directory would have to go.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = HistoryStore::new(blocker.join("data").join("history.json"));

        assert!(store.load().unwrap().is_empty());
        assert!(store.append("T", "R").is_err());
    }

    #[test]
    fn test_append_then_load_last_matches() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append("first", "report one").unwrap();
        let record = store.append("second", "report two").unwrap();

        let records = store.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.last(), Some(&record));
    }

    #[test]
    fn test_append_order_preserved() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for i in 0..5 {
            store.append(format!("topic {i}"), format!("report {i}")).unwrap();
        }

        let topics: Vec<String> = store.load().unwrap().into_iter().map(|r| r.topic).collect();
        assert_eq!(
            topics,
            vec!["topic 0", "topic 1", "topic 2", "topic 3", "topic 4"]
        );

        let recent = store.load_recent().unwrap();
        assert_eq!(recent[0].topic, "topic 4");
    }

    #[test]
    fn test_corrupt_log_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "{\"topic\": broken").unwrap();

        assert!(store.load().unwrap().is_empty());
        assert!(store.quarantine_path().exists());
        assert!(!store.path().exists());

        store.append("fresh", "new report").unwrap();
        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "fresh");
        assert_eq!(
            std::fs::read_to_string(store.quarantine_path()).unwrap(),
            "{\"topic\": broken"
        );
    }

    #[test]
    fn test_structurally_invalid_log_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), r#"{"topic": "not a list"}"#).unwrap();

        assert!(store.load().unwrap().is_empty());
        assert!(store.quarantine_path().exists());
    }

    #[test]
    fn test_invalid_utf8_log_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), [0xff, 0xfe, 0x00]).unwrap();

        assert!(store.load().unwrap().is_empty());
        assert!(store.quarantine_path().exists());
    }

    #[test]
    fn test_reads_naive_timestamps() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(
            store.path(),
            r#"[{"topic": "legacy", "report": "r", "timestamp": "2025-01-15T09:30:12.345678"}]"#,
        )
        .unwrap();

        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].timestamp.naive_local().to_string(),
            "2025-01-15 09:30:12.345678"
        );
    }

    #[test]
    fn test_timestamp_written_as_iso8601() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append("t", "r").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let ts = raw[0]["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        std::thread::scope(|s| {
            for t in 0..4 {
                let path = path.clone();
                s.spawn(move || {
                    let store = HistoryStore::new(path);
                    for i in 0..10 {
                        store.append(format!("t{t}-{i}"), "r").unwrap();
                    }
                });
            }
        });

        assert_eq!(HistoryStore::new(path).load().unwrap().len(), 40);
    }

    #[test]
    fn test_export_markdown() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let record = store.append("Quantum computing advances", "# Report").unwrap();
        assert_eq!(record.suggested_file_name(), "quantum-computing-advances.md");

        let dest = dir.path().join("out").join(record.suggested_file_name());
        HistoryStore::export_markdown(&record, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "# Report");
    }

    #[test]
    fn test_suggested_file_name_fallback() {
        let record = SessionRecord {
            topic: "???".into(),
            report: String::new(),
            timestamp: Local::now(),
        };
        assert_eq!(record.suggested_file_name(), "report.md");
    }
}
