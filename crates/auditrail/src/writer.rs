//! The write path: validate, enrich, persist, then feed the monitor.

use crate::error::{AuditError, Result};
use crate::event::{ActivityLog, Category, NewActivity, Severity};
use crate::categorize::severity_for_action;
use crate::config::AuditConfig;
use crate::metadata::{collect_metadata, validate_metadata, MAX_METADATA_BYTES};
use crate::monitor::RealTimeMonitor;
use crate::store::ActivityStore;
use crate::validation::{sanitize_params, validate_params};
use std::sync::Arc;

/// Records activities into an [`ActivityStore`].
///
/// Input problems come back as validation errors and never reach the store.
/// Anything that fails afterwards is logged with a redacted view of the
/// input and surfaces as [`AuditError::LogFailed`].
#[derive(Clone)]
pub struct ActivityLogger {
    store: Arc<dyn ActivityStore>,
    monitor: Option<Arc<RealTimeMonitor>>,
    max_metadata_bytes: usize,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            monitor: None,
            max_metadata_bytes: MAX_METADATA_BYTES,
        }
    }

    /// A logger using the metadata size limit from `config`.
    pub fn from_config(store: Arc<dyn ActivityStore>, config: &AuditConfig) -> Self {
        Self::new(store).max_metadata_bytes(config.max_metadata_bytes)
    }

    /// Feed every stored entry to `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<RealTimeMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn max_metadata_bytes(mut self, limit: usize) -> Self {
        self.max_metadata_bytes = limit;
        self
    }

    pub fn store(&self) -> &Arc<dyn ActivityStore> {
        &self.store
    }

    /// Validate, classify and persist one activity.
    pub async fn log_activity(&self, activity: NewActivity) -> Result<ActivityLog> {
        if let Err(e) = validate_params(&activity) {
            tracing::warn!(field = e.field().unwrap_or_default(), "Rejected activity: {}", e);
            return Err(e);
        }

        let diagnostic = sanitize_params(&activity);
        let record = match collect_metadata(activity) {
            Ok(record) => record,
            Err(e) => {
                let activity = serde_json::to_string(&diagnostic).unwrap_or_default();
                tracing::error!(error = %e, %activity, "Failed to log activity");
                return Err(AuditError::LogFailed);
            }
        };

        // The limit applies to what is stored, automatic keys included.
        if let Some(ref metadata) = record.metadata {
            if let Err(e) = validate_metadata(metadata, self.max_metadata_bytes) {
                tracing::warn!("Rejected activity metadata: {}", e);
                return Err(e);
            }
        }

        let log = match self.store.insert(record).await {
            Ok(log) => log,
            Err(e) => {
                let activity = serde_json::to_string(&diagnostic).unwrap_or_default();
                tracing::error!(error = %e, %activity, "Failed to log activity");
                return Err(AuditError::LogFailed);
            }
        };

        tracing::info!(
            id = log.id,
            action = %log.action,
            category = %log.category,
            severity = %log.severity,
            status = %log.status,
            "Activity logged"
        );

        if let Some(ref monitor) = self.monitor {
            monitor.monitor_real_time_activity(&log);
        }

        Ok(log)
    }

    /// An action performed by `user_id`. Resource type defaults to `user`.
    pub async fn log_user_action(&self, user_id: i64, mut activity: NewActivity) -> Result<ActivityLog> {
        activity.user_id = Some(user_id);
        default_resource_type(&mut activity, "user");
        self.log_activity(activity).await
    }

    /// An event with no acting user, categorized `system` unless set.
    pub async fn log_system_event(&self, mut activity: NewActivity) -> Result<ActivityLog> {
        activity.user_id = None;
        activity.category.get_or_insert(Category::System);
        default_resource_type(&mut activity, "system");
        self.log_activity(activity).await
    }

    /// A security event, categorized `security` and at least `high` severity
    /// unless set.
    pub async fn log_security_event(&self, mut activity: NewActivity) -> Result<ActivityLog> {
        activity.category.get_or_insert(Category::Security);
        if activity.severity.is_none() {
            activity.severity = Some(severity_for_action(&activity.action).max(Severity::High));
        }
        default_resource_type(&mut activity, "security");
        self.log_activity(activity).await
    }

    /// A sign-in related event, categorized `authentication` unless set.
    pub async fn log_authentication_event(
        &self,
        user_id: Option<i64>,
        mut activity: NewActivity,
    ) -> Result<ActivityLog> {
        if user_id.is_some() {
            activity.user_id = user_id;
        }
        activity.category.get_or_insert(Category::Authentication);
        default_resource_type(&mut activity, "auth");
        self.log_activity(activity).await
    }

    /// Log each activity in order; one failure does not stop the rest.
    pub async fn log_bulk_activities(&self, activities: Vec<NewActivity>) -> Vec<Result<ActivityLog>> {
        let mut results = Vec::with_capacity(activities.len());
        for activity in activities {
            results.push(self.log_activity(activity).await);
        }
        results
    }
}

fn default_resource_type(activity: &mut NewActivity, resource_type: &str) {
    if activity.resource_type.trim().is_empty() {
        activity.resource_type = resource_type.to_string();
    }
}
