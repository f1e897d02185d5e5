//! Audit trail and security monitoring.
//!
//! Every notable action is captured as an immutable [`ActivityLog`]: validated,
//! auto-classified by category, severity and status, enriched with redacted
//! metadata, then persisted. Stored entries can be read back through a
//! forgiving filter, aggregated into statistics and compliance reports, and
//! watched in real time for bursts and failure streaks.
//!
//! # Example
//!
//! ```rust,no_run
//! use auditrail::{
//!     ActivityFilter, ActivityLogger, ActivityRetrieval, InMemoryActivityStore, MonitorConfig,
//!     NewActivity, RealTimeMonitor,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> auditrail::Result<()> {
//! let store = Arc::new(InMemoryActivityStore::new());
//! let monitor = Arc::new(RealTimeMonitor::new(MonitorConfig::default()));
//! monitor.on_alert(|alert| eprintln!("ALERT: {}", alert.message));
//!
//! let logger = ActivityLogger::new(store.clone()).with_monitor(monitor);
//! logger
//!     .log_activity(
//!         NewActivity::new("login_failed", "auth", "Wrong password")
//!             .user(42)
//!             .ip_address("203.0.113.7"),
//!     )
//!     .await?;
//!
//! let page = ActivityRetrieval::new(store)
//!     .get_activities(&ActivityFilter::new().user(42))
//!     .await?;
//! assert_eq!(page.pagination.total, 1);
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod categorize;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod logging;
pub mod metadata;
pub mod monitor;
pub mod query;
pub mod retrieval;
pub mod store;
pub mod validation;
pub mod writer;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use analytics::{
    ActivityAnalytics, AnomalyReport, ComplianceReport, ComplianceRequest, DashboardSummary,
    StatisticsRequest, StatisticsRow, TrendPoint,
};
pub use categorize::{
    detect_category, is_valid_action, severity_for_action, status_for_action, ActionKind,
    Categorization,
};
pub use config::{AnomalyConfig, AuditConfig, LogFormat, LoggingConfig, MonitorConfig};
pub use error::{AuditError, Result};
pub use event::{ActivityLog, ActivityRecord, Actor, Category, NewActivity, Severity, Status};
pub use filter::{normalize_filter, ActivityFilter, ActivityQuery, SortField, SortOrder};
pub use logging::init_tracing;
pub use metadata::{collect_metadata, sanitize_metadata, validate_metadata};
pub use monitor::{AlertKind, RealTimeMonitor, SecurityAlert, SubscriptionId};
pub use query::{Granularity, GroupKey, GroupRow, Paginated, Pagination, StoreQuery};
pub use retrieval::ActivityRetrieval;
pub use store::{ActivityStore, FileActivityStore, InMemoryActivityStore};
pub use validation::{sanitize_params, validate_json, validate_params, SanitizedActivity};
pub use writer::ActivityLogger;
