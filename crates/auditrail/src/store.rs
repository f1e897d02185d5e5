use crate::error::{AuditError, Result};
use crate::event::{ActivityLog, ActivityRecord, Actor};
use crate::query::{GroupKey, GroupRow, StoreQuery};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

pub mod file;
pub mod memory;

pub use file::FileActivityStore;
pub use memory::InMemoryActivityStore;

/// Append-only storage for audit entries.
///
/// Entries are never updated or deleted once inserted. Implementations
/// assign `id` (strictly increasing) and `created_at` on insert.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Persist a record and return the stored entry.
    async fn insert(&self, record: ActivityRecord) -> Result<ActivityLog>;

    /// Execute a query and return matching entries.
    async fn query(&self, query: &StoreQuery) -> Result<Vec<ActivityLog>>;

    /// Count entries matching the query's predicates.
    async fn count(&self, query: &StoreQuery) -> Result<u64>;

    /// Count matching entries per distinct key tuple.
    async fn group_count(&self, query: &StoreQuery, keys: &[GroupKey]) -> Result<Vec<GroupRow>>;
}

/// Known actors, joined onto query results on request.
#[derive(Debug, Default)]
pub struct ActorDirectory {
    actors: RwLock<HashMap<i64, Actor>>,
}

impl ActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an actor.
    pub fn register(&self, actor: Actor) -> Result<()> {
        let mut actors = self
            .actors
            .write()
            .map_err(|_| AuditError::Store("Lock poisoned".to_string()))?;
        actors.insert(actor.id, actor);
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<Option<Actor>> {
        let actors = self
            .actors
            .read()
            .map_err(|_| AuditError::Store("Lock poisoned".to_string()))?;
        Ok(actors.get(&id).cloned())
    }

    /// Set `user` on each entry whose actor is known. System events stay `None`.
    pub fn attach(&self, logs: &mut [ActivityLog]) -> Result<()> {
        let actors = self
            .actors
            .read()
            .map_err(|_| AuditError::Store("Lock poisoned".to_string()))?;
        for log in logs.iter_mut() {
            log.user = log.user_id.and_then(|id| actors.get(&id).cloned());
        }
        Ok(())
    }
}
