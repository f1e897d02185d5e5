use super::{ActivityStore, ActorDirectory};
use crate::error::{AuditError, Result};
use crate::event::{ActivityLog, ActivityRecord, Actor};
use crate::query::{group_logs, GroupKey, GroupRow, StoreQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct MemoryState {
    logs: Vec<ActivityLog>,
    last_id: i64,
}

/// In-memory activity store (not persistent, for testing/dev).
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActivityStore {
    state: Arc<RwLock<MemoryState>>,
    actors: Arc<ActorDirectory>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an actor available to queries that request the user join.
    pub fn register_actor(&self, actor: Actor) -> Result<()> {
        self.actors.register(actor)
    }

    /// Insert with an explicit timestamp, for backfills and imports.
    pub fn insert_at(&self, record: ActivityRecord, created_at: DateTime<Utc>) -> Result<ActivityLog> {
        let mut state = self
            .state
            .write()
            .map_err(|_| AuditError::Store("Lock poisoned".to_string()))?;
        state.last_id += 1;
        let log = ActivityLog::from_record(state.last_id, created_at, record);
        state.logs.push(log.clone());
        Ok(log)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.logs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn insert(&self, record: ActivityRecord) -> Result<ActivityLog> {
        self.insert_at(record, Utc::now())
    }

    async fn query(&self, query: &StoreQuery) -> Result<Vec<ActivityLog>> {
        let mut results = {
            let state = self
                .state
                .read()
                .map_err(|_| AuditError::Store("Lock poisoned".to_string()))?;
            query.apply(&state.logs)
        };
        if query.include_user {
            self.actors.attach(&mut results)?;
        }
        Ok(results)
    }

    async fn count(&self, query: &StoreQuery) -> Result<u64> {
        let state = self
            .state
            .read()
            .map_err(|_| AuditError::Store("Lock poisoned".to_string()))?;
        Ok(state.logs.iter().filter(|l| query.matches(l)).count() as u64)
    }

    async fn group_count(&self, query: &StoreQuery, keys: &[GroupKey]) -> Result<Vec<GroupRow>> {
        let state = self
            .state
            .read()
            .map_err(|_| AuditError::Store("Lock poisoned".to_string()))?;
        Ok(group_logs(query, &state.logs, keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::Categorization;
    use crate::event::{Category, Severity, Status};
    use crate::filter::{SortField, SortOrder};
    use crate::query::Field;

    fn record(action: &str, user_id: Option<i64>) -> ActivityRecord {
        let c = Categorization::for_action(action);
        ActivityRecord {
            user_id,
            session_id: None,
            action: action.into(),
            resource_type: "user".into(),
            resource_id: None,
            resource_uuid: None,
            description: format!("{action} happened"),
            category: c.category,
            severity: c.severity,
            status: c.status,
            old_values: None,
            new_values: None,
            metadata: None,
            ip_address: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = InMemoryActivityStore::new();
        let a = store.insert(record("login", Some(1))).await.unwrap();
        let b = store.insert(record("logout", Some(1))).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert!(b.created_at >= a.created_at);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_query_and_count() {
        let store = InMemoryActivityStore::new();
        store.insert(record("login", Some(1))).await.unwrap();
        store.insert(record("login_failed", Some(2))).await.unwrap();
        store.insert(record("user_deleted", Some(1))).await.unwrap();

        let q = StoreQuery::new()
            .eq(Field::UserId, 1i64)
            .order_by(SortField::Id, SortOrder::Desc);
        let results = store.query(&q).await.unwrap();
        assert_eq!(results.iter().map(|l| l.id).collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(store.count(&q).await.unwrap(), 2);

        let failures = StoreQuery::new().eq(Field::Status, Status::Failure);
        assert_eq!(store.count(&failures).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_user_join() {
        let store = InMemoryActivityStore::new();
        store.register_actor(Actor::new(1, "Grace")).unwrap();
        store.insert(record("login", Some(1))).await.unwrap();
        store.insert(record("system_startup", None)).await.unwrap();

        let plain = store.query(&StoreQuery::new()).await.unwrap();
        assert!(plain.iter().all(|l| l.user.is_none()));

        let joined = store.query(&StoreQuery::new().with_user(true)).await.unwrap();
        assert_eq!(joined[0].user.as_ref().unwrap().name, "Grace");
        assert!(joined[1].user.is_none());
    }

    #[tokio::test]
    async fn test_group_count() {
        let store = InMemoryActivityStore::new();
        for action in ["login", "logout", "user_deleted", "backup_failed"] {
            store.insert(record(action, Some(1))).await.unwrap();
        }
        let rows = store
            .group_count(&StoreQuery::new(), &[GroupKey::Category])
            .await
            .unwrap();
        let auth = rows
            .iter()
            .find(|r| r.keys[0] == Category::Authentication.as_str())
            .unwrap();
        assert_eq!(auth.count, 2);

        let rows = store
            .group_count(&StoreQuery::new(), &[GroupKey::Severity])
            .await
            .unwrap();
        let critical = rows
            .iter()
            .find(|r| r.keys[0] == Severity::Critical.as_str())
            .unwrap();
        assert_eq!(critical.count, 1);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let store = InMemoryActivityStore::new();
        let clone = store.clone();
        clone.insert(record("login", None)).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
