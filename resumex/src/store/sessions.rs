//! Session record persistence and identifier resolution.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use crate::models::SessionRecord;

const SESSIONS_DIR: &str = "sessions";
const LOGS_DIR: &str = "logs";
const RECORD_EXT: &str = "json";
const LOG_EXT: &str = "log";

/// Stores one JSON file per session under `<base>/sessions`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
    logs_dir: PathBuf,
}

impl SessionStore {
    /// Open the store rooted at `base_dir`, creating its directories.
    pub fn open(base_dir: &Path) -> StoreResult<Self> {
        let sessions_dir = base_dir.join(SESSIONS_DIR);
        let logs_dir = base_dir.join(LOGS_DIR);

        for dir in [&sessions_dir, &logs_dir] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }

        Ok(Self {
            sessions_dir,
            logs_dir,
        })
    }

    /// Allocate a new running session. Nothing is written until [`save`](Self::save).
    pub fn create(&self, command_line: String, working_directory: PathBuf) -> SessionRecord {
        let identifier = Uuid::new_v4().to_string();
        let log_path = self.log_path(&identifier);
        SessionRecord::new(identifier, command_line, working_directory, log_path)
    }

    /// Write the record, replacing any previous version.
    ///
    /// The JSON is written to a temporary sibling and renamed into place so a
    /// concurrent reader never sees a partial record.
    pub fn save(&self, record: &SessionRecord) -> StoreResult<()> {
        let path = self.record_path(&record.identifier);
        let content = serde_json::to_string_pretty(record).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let temp_path = self
            .sessions_dir
            .join(format!(".{}.tmp.{}", record.identifier, Uuid::new_v4()));

        if let Err(e) = fs::write(&temp_path, content) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io(&temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io(&path, e));
        }

        debug!(id = %record.identifier, status = %record.status, "saved session");
        Ok(())
    }

    /// Load a record by its full identifier.
    pub fn load(&self, identifier: &str) -> StoreResult<SessionRecord> {
        let path = self.record_path(identifier);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(identifier.to_string()));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        serde_json::from_str(&content).map_err(|source| StoreError::Json { path, source })
    }

    /// Delete a session's record and, best-effort, its log.
    ///
    /// A record that no longer parses is still removed; its log is then
    /// located by the default naming scheme.
    pub fn delete(&self, identifier: &str) -> StoreResult<()> {
        let log_path = match self.load(identifier) {
            Ok(record) => record.log_path,
            Err(StoreError::Json { .. }) => self.log_path(identifier),
            Err(e) => return Err(e),
        };

        match fs::remove_file(&log_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %log_path.display(),
                error = %e,
                "could not delete log file"
            ),
        }

        let path = self.record_path(identifier);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(identifier.to_string()))
            }
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Identifiers of all stored sessions, in directory order.
    pub fn list(&self) -> StoreResult<Vec<String>> {
        let entries =
            fs::read_dir(&self.sessions_dir).map_err(|e| StoreError::io(&self.sessions_dir, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.sessions_dir, e))?;
            let path = entry.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    ids.push(stem.to_string());
                }
            }
        }

        Ok(ids)
    }

    /// Load every readable record, newest first.
    ///
    /// Records that fail to load are skipped with a warning.
    pub fn load_all(&self) -> StoreResult<Vec<SessionRecord>> {
        let mut records = Vec::new();

        for id in self.list()? {
            match self.load(&id) {
                Ok(record) => records.push(record),
                Err(e) => warn!(id = %id, error = %e, "could not load session"),
            }
        }

        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(records)
    }

    /// Resolve a full identifier or an unambiguous prefix of one.
    pub fn resolve(&self, prefix: &str) -> StoreResult<String> {
        if prefix.is_empty() {
            return Err(StoreError::NotFound(String::new()));
        }

        let mut found: Option<String> = None;
        let mut count = 0usize;

        for id in self.list()? {
            if id.starts_with(prefix) {
                count += 1;
                if found.is_none() {
                    found = Some(id);
                }
            }
        }

        match (found, count) {
            (Some(id), 1) => Ok(id),
            (None, _) => Err(StoreError::NotFound(prefix.to_string())),
            (Some(_), count) => Err(StoreError::Ambiguous {
                prefix: prefix.to_string(),
                count,
            }),
        }
    }

    fn log_path(&self, identifier: &str) -> PathBuf {
        self.logs_dir.join(format!("{identifier}.{LOG_EXT}"))
    }

    fn record_path(&self, identifier: &str) -> PathBuf {
        self.sessions_dir.join(format!("{identifier}.{RECORD_EXT}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn record_with_id(store: &SessionStore, id: &str) -> SessionRecord {
        let mut record = store.create("echo hi".to_string(), PathBuf::from("/tmp"));
        record.identifier = id.to_string();
        record
    }

    #[test]
    fn test_open_creates_directories() {
        let (dir, _store) = store();
        assert!(dir.path().join("sessions").is_dir());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_create_assigns_unique_ids_and_log_paths() {
        let (dir, store) = store();
        let a = store.create("wget x".to_string(), PathBuf::from("/tmp"));
        let b = store.create("wget x".to_string(), PathBuf::from("/tmp"));

        assert_ne!(a.identifier, b.identifier);
        assert_eq!(
            a.log_path,
            dir.path().join("logs").join(format!("{}.log", a.identifier))
        );
        assert_eq!(a.status, SessionStatus::Running);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let (_dir, store) = store();
        let mut record = store.create("rsync -a src dst".to_string(), PathBuf::from("/data"));
        record.mark_completed(0);
        store.save(&record).unwrap();

        let loaded = store.load(&record.identifier).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_save_overwrites_previous_version() {
        let (_dir, store) = store();
        let mut record = store.create("curl http://x".to_string(), PathBuf::from("/tmp"));
        store.save(&record).unwrap();

        record.mark_interrupted();
        store.save(&record).unwrap();

        let loaded = store.load(&record.identifier).unwrap();
        assert_eq!(loaded.status, SessionStatus::Interrupted);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.load("does-not-exist").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_load_corrupt_record_is_json_error() {
        let (dir, store) = store();
        fs::write(dir.path().join("sessions").join("broken.json"), "{not json").unwrap();

        let err = store.load("broken").unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
    }

    #[test]
    fn test_delete_removes_record_and_log() {
        let (_dir, store) = store();
        let record = store.create("wget x".to_string(), PathBuf::from("/tmp"));
        store.save(&record).unwrap();
        fs::write(&record.log_path, "[STDOUT] hi\n").unwrap();

        store.delete(&record.identifier).unwrap();

        assert!(!record.log_path.exists());
        assert!(matches!(
            store.load(&record.identifier),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_without_log_succeeds() {
        let (_dir, store) = store();
        let record = store.create("wget x".to_string(), PathBuf::from("/tmp"));
        store.save(&record).unwrap();

        assert!(store.delete(&record.identifier).is_ok());
    }

    #[test]
    fn test_delete_corrupt_record() {
        let (dir, store) = store();
        let record_path = dir.path().join("sessions").join("broken.json");
        let log_path = dir.path().join("logs").join("broken.log");
        fs::write(&record_path, "{").unwrap();
        fs::write(&log_path, "x").unwrap();

        store.delete("broken").unwrap();

        assert!(!record_path.exists());
        assert!(!log_path.exists());
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.delete("nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let (dir, store) = store();
        let record = store.create("tar -xf a.tar".to_string(), PathBuf::from("/tmp"));
        store.save(&record).unwrap();
        fs::write(dir.path().join("sessions").join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("sessions").join(".abc.tmp.json"), "x").unwrap();

        assert_eq!(store.list().unwrap(), vec![record.identifier]);
    }

    #[test]
    fn test_load_all_sorts_newest_first_and_skips_broken() {
        let (dir, store) = store();

        let mut older = store.create("wget a".to_string(), PathBuf::from("/tmp"));
        older.start_time -= chrono::Duration::hours(1);
        let newer = store.create("wget b".to_string(), PathBuf::from("/tmp"));
        store.save(&older).unwrap();
        store.save(&newer).unwrap();
        fs::write(dir.path().join("sessions").join("broken.json"), "{").unwrap();

        let records = store.load_all().unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec![newer.identifier.as_str(), older.identifier.as_str()]);
    }

    #[test]
    fn test_resolve_prefix() {
        let (_dir, store) = store();
        store.save(&record_with_id(&store, "abc123def")).unwrap();
        store.save(&record_with_id(&store, "abc999def")).unwrap();

        assert!(matches!(
            store.resolve("abc"),
            Err(StoreError::Ambiguous { count: 2, .. })
        ));
        assert_eq!(store.resolve("abc1").unwrap(), "abc123def");
        assert_eq!(store.resolve("abc999def").unwrap(), "abc999def");
        assert!(matches!(store.resolve("xyz"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.resolve(""), Err(StoreError::NotFound(_))));
    }
}
