//! Fixtures for exercising the audit pipeline in tests.

use crate::error::{AuditError, Result};
use crate::event::{ActivityLog, ActivityRecord, NewActivity};
use crate::metadata::collect_metadata;
use crate::monitor::SecurityAlert;
use crate::query::{GroupKey, GroupRow, StoreQuery};
use crate::store::ActivityStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A valid activity for `action` against a `user` resource.
pub fn sample_activity(action: &str) -> NewActivity {
    NewActivity::new(action, "user", format!("Sample {action} activity"))
        .resource_id(1)
        .resource_uuid(uuid::Uuid::new_v4().to_string())
        .ip_address("192.168.1.10")
        .user_agent("auditrail-tests/1.0")
}

/// A classified record for `action`, ready for direct store insertion.
pub fn sample_record(action: &str) -> ActivityRecord {
    collect_metadata(sample_activity(action)).expect("sample metadata serializes")
}

/// A store whose every operation fails, counting the attempts.
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store operations attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AuditError::Store("database unavailable".to_string()))
    }
}

#[async_trait]
impl ActivityStore for FailingStore {
    async fn insert(&self, _record: ActivityRecord) -> Result<ActivityLog> {
        self.fail()
    }

    async fn query(&self, _query: &StoreQuery) -> Result<Vec<ActivityLog>> {
        self.fail()
    }

    async fn count(&self, _query: &StoreQuery) -> Result<u64> {
        self.fail()
    }

    async fn group_count(&self, _query: &StoreQuery, _keys: &[GroupKey]) -> Result<Vec<GroupRow>> {
        self.fail()
    }
}

/// Collects what a monitor publishes.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    activities: Arc<Mutex<Vec<ActivityLog>>>,
    alerts: Arc<Mutex<Vec<SecurityAlert>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activity_callback(&self) -> impl Fn(&ActivityLog) + Send + Sync + 'static {
        let activities = Arc::clone(&self.activities);
        move |log: &ActivityLog| {
            if let Ok(mut activities) = activities.lock() {
                activities.push(log.clone());
            }
        }
    }

    pub fn alert_callback(&self) -> impl Fn(&SecurityAlert) + Send + Sync + 'static {
        let alerts = Arc::clone(&self.alerts);
        move |alert: &SecurityAlert| {
            if let Ok(mut alerts) = alerts.lock() {
                alerts.push(alert.clone());
            }
        }
    }

    pub fn activities(&self) -> Vec<ActivityLog> {
        self.activities
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<SecurityAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}
