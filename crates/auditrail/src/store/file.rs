use super::{ActivityStore, ActorDirectory};
use crate::error::{AuditError, Result};
use crate::event::{ActivityLog, ActivityRecord, Actor};
use crate::query::{group_logs, GroupKey, GroupRow, StoreQuery};
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct Writer {
    file: File,
    last_id: i64,
}

/// File-based activity store (JSON Lines format).
///
/// Ids keep increasing across reopen: the highest id already on disk is
/// picked up when the file is opened.
pub struct FileActivityStore {
    path: PathBuf,
    writer: Mutex<Writer>,
    actors: ActorDirectory,
}

impl FileActivityStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AuditError::Io(format!("Failed to create directories: {}", e))
                })?;
            }
        }

        let last_id = read_logs(&path)?.iter().map(|l| l.id).max().unwrap_or(0);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::Io(format!("Failed to open file: {}", e)))?;

        tracing::debug!(path = %path.display(), last_id, "Opened activity file");

        Ok(Self {
            path,
            writer: Mutex::new(Writer { file, last_id }),
            actors: ActorDirectory::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn register_actor(&self, actor: Actor) -> Result<()> {
        self.actors.register(actor)
    }

    fn read_all(&self) -> Result<Vec<ActivityLog>> {
        read_logs(&self.path)
    }
}

fn read_logs(path: &Path) -> Result<Vec<ActivityLog>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)
        .map_err(|e| AuditError::Io(format!("Failed to open file for reading: {}", e)))?;

    let mut logs = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| AuditError::Io(format!("Failed to read line: {}", e)))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ActivityLog>(&line) {
            Ok(log) => logs.push(log),
            Err(e) => tracing::warn!("Skipping unreadable activity line: {}", e),
        }
    }

    Ok(logs)
}

#[async_trait]
impl ActivityStore for FileActivityStore {
    async fn insert(&self, record: ActivityRecord) -> Result<ActivityLog> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AuditError::Store("Lock poisoned".to_string()))?;

        let log = ActivityLog::from_record(writer.last_id + 1, Utc::now(), record);
        let json = serde_json::to_string(&log)?;

        writeln!(writer.file, "{}", json)
            .and_then(|_| writer.file.flush())
            .map_err(|e| AuditError::Io(format!("Failed to write: {}", e)))?;

        writer.last_id = log.id;
        Ok(log)
    }

    async fn query(&self, query: &StoreQuery) -> Result<Vec<ActivityLog>> {
        let logs = self.read_all()?;
        let mut results = query.apply(&logs);
        if query.include_user {
            self.actors.attach(&mut results)?;
        }
        Ok(results)
    }

    async fn count(&self, query: &StoreQuery) -> Result<u64> {
        let logs = self.read_all()?;
        Ok(logs.iter().filter(|l| query.matches(l)).count() as u64)
    }

    async fn group_count(&self, query: &StoreQuery, keys: &[GroupKey]) -> Result<Vec<GroupRow>> {
        let logs = self.read_all()?;
        Ok(group_logs(query, &logs, keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NewActivity;
    use crate::metadata::collect_metadata;
    use crate::query::Field;
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_store() -> (FileActivityStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        let store = FileActivityStore::open(&path).unwrap();
        (store, dir)
    }

    fn record(action: &str, user_id: i64) -> ActivityRecord {
        collect_metadata(
            NewActivity::new(action, "user", "File store test")
                .user(user_id)
                .changes(json!({"name": "a"}), json!({"name": "b"})),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_store_insert_and_query() {
        let (store, _dir) = temp_store();

        store.insert(record("login", 1)).await.unwrap();
        store.insert(record("logout", 2)).await.unwrap();
        store.insert(record("login", 1)).await.unwrap();

        let q = StoreQuery::new().eq(Field::UserId, 1i64);
        let results = store.query(&q).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].new_values, Some(json!({"name": "b"})));
        assert_eq!(store.count(&StoreQuery::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_file_store_ids_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("activity.log");

        {
            let store = FileActivityStore::open(&path).unwrap();
            store.insert(record("login", 1)).await.unwrap();
            store.insert(record("logout", 1)).await.unwrap();
        }

        let store = FileActivityStore::open(&path).unwrap();
        let log = store.insert(record("login", 1)).await.unwrap();
        assert_eq!(log.id, 3);
        assert_eq!(store.count(&StoreQuery::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_file_store_skips_corrupt_lines() {
        let (store, _dir) = temp_store();
        store.insert(record("login", 1)).await.unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
            writeln!(file, "not json").unwrap();
        }
        store.insert(record("logout", 1)).await.unwrap();

        assert_eq!(store.count(&StoreQuery::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_file_store_user_join() {
        let (store, _dir) = temp_store();
        store.register_actor(Actor::new(1, "Linus")).unwrap();
        store.insert(record("login", 1)).await.unwrap();

        let results = store
            .query(&StoreQuery::new().with_user(true))
            .await
            .unwrap();
        assert_eq!(results[0].user.as_ref().unwrap().name, "Linus");
    }
}
