//! Aggregate views over the audit trail: period statistics, dashboard
//! summary, volume anomaly detection and compliance reports.

use crate::config::{AnomalyConfig, AuditConfig};
use crate::error::{AuditError, Result};
use crate::event::{ActivityLog, Category, Severity, Status};
use crate::filter::{normalize_filter, ActivityFilter, SortField, SortOrder};
use crate::query::{build_count_query, Field, Granularity, GroupKey, GroupRow, StoreQuery};
use crate::store::ActivityStore;
use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Critical entries included in a compliance report.
pub const MAX_CRITICAL_EVENTS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsRequest {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub granularity: Granularity,
    pub category: Option<Category>,
    pub user_id: Option<i64>,
}

/// Count of entries in one period and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub period: String,
    pub category: Category,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_activities: u64,
    /// Percentage of `success` entries; 0 when there are none.
    pub success_rate: f64,
    pub by_category: BTreeMap<Category, u64>,
    pub by_severity: BTreeMap<Severity, u64>,
    pub by_status: BTreeMap<Status, u64>,
    /// Daily counts for the trailing trend window, oldest first.
    pub trend: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub anomalous: bool,
    pub current_count: u64,
    pub historical_average: f64,
    /// The count the current window had to exceed.
    pub threshold: f64,
    pub window_secs: u64,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceRequest {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ComplianceRequest {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub total_activities: u64,
    pub by_category: BTreeMap<Category, u64>,
    pub by_severity: BTreeMap<Severity, u64>,
    pub by_status: BTreeMap<Status, u64>,
    /// Entries with status `failure` or `error`.
    pub failed_activities: u64,
    /// Distinct acting users; system events are not counted.
    pub unique_actors: u64,
    pub security_events: u64,
    /// Newest first, at most [`MAX_CRITICAL_EVENTS`].
    pub critical_events: Vec<ActivityLog>,
}

/// Sum grouped rows by their first key, seeded with zero for every value.
fn tally<K: Ord + Copy>(rows: &[GroupRow], all: &[K], parse: fn(&str) -> Option<K>) -> BTreeMap<K, u64> {
    let mut counts: BTreeMap<K, u64> = all.iter().map(|k| (*k, 0)).collect();
    for row in rows {
        if let Some(key) = row.keys.first().and_then(|k| parse(k)) {
            *counts.entry(key).or_default() += row.count;
        }
    }
    counts
}

/// Aggregations over an [`ActivityStore`].
#[derive(Clone)]
pub struct ActivityAnalytics {
    store: Arc<dyn ActivityStore>,
    trend_days: u32,
}

impl ActivityAnalytics {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            trend_days: 7,
        }
    }

    /// Analytics using the trend window from `config`.
    pub fn from_config(store: Arc<dyn ActivityStore>, config: &AuditConfig) -> Self {
        Self::new(store).trend_days(config.trend_days)
    }

    /// Days covered by the dashboard trend, today included.
    pub fn trend_days(mut self, days: u32) -> Self {
        self.trend_days = days.max(1);
        self
    }

    /// Counts per period and category, ordered by period then category.
    pub async fn get_activity_statistics(&self, request: &StatisticsRequest) -> Result<Vec<StatisticsRow>> {
        let mut query = StoreQuery::new();
        if let Some(from) = request.date_from {
            query = query.created_from(from);
        }
        if let Some(to) = request.date_to {
            query = query.created_to(to);
        }
        if let Some(category) = request.category {
            query = query.eq(Field::Category, category);
        }
        if let Some(user_id) = request.user_id {
            query = query.eq(Field::UserId, user_id);
        }

        let rows = self
            .store
            .group_count(
                &query,
                &[GroupKey::Period(request.granularity), GroupKey::Category],
            )
            .await?;

        let mut stats: Vec<StatisticsRow> = rows
            .into_iter()
            .filter_map(|row| {
                let category = Category::parse(row.keys.get(1)?)?;
                Some(StatisticsRow {
                    period: row.keys.first()?.clone(),
                    category,
                    count: row.count,
                })
            })
            .collect();
        stats.sort_by(|a, b| a.period.cmp(&b.period).then(a.category.cmp(&b.category)));
        Ok(stats)
    }

    /// Headline numbers for entries matching `filter`.
    ///
    /// Paging and sort fields of the filter are ignored.
    pub async fn get_dashboard_summary(&self, filter: &ActivityFilter) -> Result<DashboardSummary> {
        self.dashboard_summary_at(filter, Utc::now()).await
    }

    async fn dashboard_summary_at(&self, filter: &ActivityFilter, now: DateTime<Utc>) -> Result<DashboardSummary> {
        let base = build_count_query(&normalize_filter(filter));

        let today = now.date_naive();
        let first_day = today
            .checked_sub_days(Days::new(u64::from(self.trend_days) - 1))
            .ok_or_else(|| {
                AuditError::validation("trend_days", "trend window reaches past the earliest date")
            })?;
        let trend_query = match first_day.and_hms_opt(0, 0, 0) {
            Some(start) => base.clone().created_from(start.and_utc()),
            None => base.clone(),
        };

        let (categories, severities, statuses, days) = tokio::try_join!(
            self.store.group_count(&base, &[GroupKey::Category]),
            self.store.group_count(&base, &[GroupKey::Severity]),
            self.store.group_count(&base, &[GroupKey::Status]),
            self.store
                .group_count(&trend_query, &[GroupKey::Period(Granularity::Day)]),
        )?;

        let by_status = tally(&statuses, &Status::ALL, Status::parse);
        let total: u64 = by_status.values().sum();
        let successes = by_status.get(&Status::Success).copied().unwrap_or(0);
        let success_rate = if total == 0 {
            0.0
        } else {
            (successes as f64 / total as f64 * 10_000.0).round() / 100.0
        };

        let daily: BTreeMap<String, u64> = days
            .into_iter()
            .filter_map(|row| Some((row.keys.into_iter().next()?, row.count)))
            .collect();
        let trend = first_day
            .iter_days()
            .take_while(|day: &NaiveDate| *day <= today)
            .map(|day| {
                let date = day.format("%Y-%m-%d").to_string();
                let count = daily.get(&date).copied().unwrap_or(0);
                TrendPoint { date, count }
            })
            .collect();

        Ok(DashboardSummary {
            total_activities: total,
            success_rate,
            by_category: tally(&categories, &Category::ALL, Category::parse),
            by_severity: tally(&severities, &Severity::ALL, Severity::parse),
            by_status,
            trend,
        })
    }

    /// Compare the current window's volume with the average of the
    /// preceding windows.
    pub async fn detect_anomalies(&self, config: &AnomalyConfig) -> Result<AnomalyReport> {
        self.detect_anomalies_at(config, Utc::now()).await
    }

    /// [`detect_anomalies`](Self::detect_anomalies) as of `now`.
    pub async fn detect_anomalies_at(&self, config: &AnomalyConfig, now: DateTime<Utc>) -> Result<AnomalyReport> {
        let window = Duration::from_std(config.window)
            .map_err(|e| AuditError::validation("window", e.to_string()))?;
        let out_of_range = || AuditError::validation("window", "anomaly window is out of range");
        let lookback = i32::try_from(config.lookback_windows).map_err(|_| {
            AuditError::validation("lookback_windows", "too many lookback windows")
        })?;
        let current_start = now.checked_sub_signed(window).ok_or_else(out_of_range)?;
        let history_start = window
            .checked_mul(lookback)
            .and_then(|span| current_start.checked_sub_signed(span))
            .ok_or_else(out_of_range)?;

        let current = StoreQuery::new().created_from(current_start).created_to(now);
        let history = StoreQuery::new()
            .created_from(history_start)
            .created_to(current_start - Duration::nanoseconds(1));

        let (current_count, history_count) =
            tokio::try_join!(self.store.count(&current), self.store.count(&history))?;

        let historical_average = if config.lookback_windows == 0 {
            0.0
        } else {
            history_count as f64 / config.lookback_windows as f64
        };
        let threshold = match config.absolute_threshold {
            Some(absolute) => absolute as f64,
            None => historical_average * config.multiplier,
        };
        let anomalous = current_count >= config.min_events && current_count as f64 > threshold;

        if anomalous {
            tracing::warn!(current_count, historical_average, threshold, "Activity volume anomaly");
        }

        Ok(AnomalyReport {
            anomalous,
            current_count,
            historical_average,
            threshold,
            window_secs: config.window.as_secs(),
            evaluated_at: now,
        })
    }

    /// Summary of everything recorded between the request's start and end.
    ///
    /// Both bounds are required; a missing one fails before any store access.
    pub async fn generate_compliance_report(&self, request: &ComplianceRequest) -> Result<ComplianceReport> {
        let (Some(start), Some(end)) = (request.start_date, request.end_date) else {
            return Err(AuditError::DateRangeRequired);
        };

        let base = StoreQuery::new().created_from(start).created_to(end);
        let critical = base
            .clone()
            .eq(Field::Severity, Severity::Critical)
            .order_by(SortField::CreatedAt, SortOrder::Desc)
            .limit(MAX_CRITICAL_EVENTS);

        let (categories, severities, statuses, actors, critical_events) = tokio::try_join!(
            self.store.group_count(&base, &[GroupKey::Category]),
            self.store.group_count(&base, &[GroupKey::Severity]),
            self.store.group_count(&base, &[GroupKey::Status]),
            self.store.group_count(&base, &[GroupKey::Actor]),
            self.store.query(&critical),
        )?;

        let by_category = tally(&categories, &Category::ALL, Category::parse);
        let by_status = tally(&statuses, &Status::ALL, Status::parse);
        let total_activities: u64 = by_status.values().sum();
        let failed_activities: u64 = by_status
            .iter()
            .filter(|(status, _)| status.is_failure())
            .map(|(_, count)| count)
            .sum();
        let unique_actors = actors
            .iter()
            .filter(|row| row.keys.first().is_some_and(|k| !k.is_empty()))
            .count() as u64;

        tracing::info!(%start, %end, total_activities, "Generated compliance report");

        Ok(ComplianceReport {
            period_start: start,
            period_end: end,
            generated_at: Utc::now(),
            total_activities,
            security_events: by_category.get(&Category::Security).copied().unwrap_or(0),
            by_category,
            by_severity: tally(&severities, &Severity::ALL, Severity::parse),
            by_status,
            failed_activities,
            unique_actors,
            critical_events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryActivityStore;
    use crate::testing::{sample_record, FailingStore};
    use chrono::TimeZone;

    fn store_with(entries: &[(&str, Option<i64>, DateTime<Utc>)]) -> Arc<InMemoryActivityStore> {
        let store = Arc::new(InMemoryActivityStore::new());
        for (action, user_id, at) in entries {
            let mut record = sample_record(action);
            record.user_id = *user_id;
            store.insert_at(record, *at).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_statistics_by_month() {
        let jan = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2024, 2, 3, 9, 0, 0).unwrap();
        let store = store_with(&[
            ("login", Some(1), jan),
            ("logout", Some(1), jan),
            ("user_created", Some(1), jan),
            ("login", Some(2), feb),
        ]);
        let analytics = ActivityAnalytics::new(store);

        let stats = analytics
            .get_activity_statistics(&StatisticsRequest::default())
            .await
            .unwrap();
        assert_eq!(
            stats,
            vec![
                StatisticsRow {
                    period: "2024-01".into(),
                    category: Category::Authentication,
                    count: 2
                },
                StatisticsRow {
                    period: "2024-01".into(),
                    category: Category::UserManagement,
                    count: 1
                },
                StatisticsRow {
                    period: "2024-02".into(),
                    category: Category::Authentication,
                    count: 1
                },
            ]
        );

        let daily = analytics
            .get_activity_statistics(&StatisticsRequest {
                granularity: Granularity::Day,
                date_from: Some(feb - Duration::days(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].period, "2024-02-03");
    }

    #[tokio::test]
    async fn test_dashboard_empty_store() {
        let analytics = ActivityAnalytics::new(Arc::new(InMemoryActivityStore::new()));
        let summary = analytics
            .get_dashboard_summary(&ActivityFilter::new())
            .await
            .unwrap();
        assert_eq!(summary.total_activities, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.by_category.len(), Category::ALL.len());
        assert!(summary.by_category.values().all(|c| *c == 0));
        assert_eq!(summary.trend.len(), 7);
    }

    #[tokio::test]
    async fn test_dashboard_counts_and_trend() {
        let now = Utc::now();
        let store = store_with(&[
            ("login", Some(1), now),
            ("login_failed", Some(1), now),
            ("backup_failed", None, now - Duration::days(2)),
            ("user_created", Some(2), now - Duration::days(2)),
            ("login", Some(3), now - Duration::days(30)),
        ]);
        let analytics = ActivityAnalytics::new(store).trend_days(3);
        let summary = analytics
            .get_dashboard_summary(&ActivityFilter::new())
            .await
            .unwrap();

        assert_eq!(summary.total_activities, 5);
        assert_eq!(summary.success_rate, 60.0);
        assert_eq!(summary.by_category[&Category::Authentication], 3);
        assert_eq!(summary.by_status[&Status::Error], 1);
        assert_eq!(summary.trend.len(), 3);
        assert_eq!(summary.trend[0].count, 2);
        assert_eq!(summary.trend[1].count, 0);
        assert_eq!(summary.trend[2].count, 2);
        assert_eq!(summary.trend[2].date, now.format("%Y-%m-%d").to_string());
    }

    #[tokio::test]
    async fn test_anomaly_detection() {
        let now = Utc::now();
        let hour = Duration::hours(1);
        let mut entries = Vec::new();
        for h in 1..=4 {
            entries.push(("login", Some(1), now - hour * h - Duration::minutes(5)));
        }
        for m in 0..10 {
            entries.push(("login", Some(1), now - Duration::minutes(m)));
        }
        let analytics = ActivityAnalytics::new(store_with(&entries));

        let config = AnomalyConfig::new().window(std::time::Duration::from_secs(3600), 4);
        let report = analytics.detect_anomalies_at(&config, now).await.unwrap();
        assert_eq!(report.current_count, 10);
        assert_eq!(report.historical_average, 1.0);
        assert!(report.anomalous);

        let lenient = config.clone().multiplier(20.0);
        assert!(!analytics.detect_anomalies_at(&lenient, now).await.unwrap().anomalous);

        let absolute = config.absolute_threshold(10);
        assert!(!analytics.detect_anomalies_at(&absolute, now).await.unwrap().anomalous);
    }

    #[tokio::test]
    async fn test_anomaly_window_out_of_range() {
        let analytics = ActivityAnalytics::new(Arc::new(InMemoryActivityStore::new()));
        let now = Utc::now();

        let huge = AnomalyConfig::new().window(std::time::Duration::from_secs(10_u64.pow(13)), 24);
        let err = analytics.detect_anomalies_at(&huge, now).await.unwrap_err();
        assert_eq!(err.field(), Some("window"));

        let long_history = AnomalyConfig::new().window(std::time::Duration::from_secs(3600), 3_000_000_000);
        let err = analytics.detect_anomalies_at(&long_history, now).await.unwrap_err();
        assert_eq!(err.field(), Some("lookback_windows"));

        let deep = AnomalyConfig::new().window(std::time::Duration::from_secs(86_400 * 365), 1_000_000);
        let err = analytics.detect_anomalies_at(&deep, now).await.unwrap_err();
        assert_eq!(err.field(), Some("window"));
    }

    #[tokio::test]
    async fn test_dashboard_trend_out_of_range() {
        let analytics =
            ActivityAnalytics::new(Arc::new(InMemoryActivityStore::new())).trend_days(u32::MAX);
        let err = analytics
            .get_dashboard_summary(&ActivityFilter::new())
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("trend_days"));
    }

    #[tokio::test]
    async fn test_from_config_uses_trend_days() {
        let config = AuditConfig::from_pairs(vec![("AUDIT_TREND_DAYS".to_string(), "14".to_string())])
            .unwrap();
        let analytics = ActivityAnalytics::from_config(Arc::new(InMemoryActivityStore::new()), &config);
        let summary = analytics
            .get_dashboard_summary(&ActivityFilter::new())
            .await
            .unwrap();
        assert_eq!(summary.trend.len(), 14);
    }

    #[tokio::test]
    async fn test_compliance_requires_both_dates() {
        let store = Arc::new(FailingStore::new());
        let analytics = ActivityAnalytics::new(store.clone());

        let err = analytics
            .generate_compliance_report(&ComplianceRequest {
                start_date: Some(Utc::now()),
                end_date: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::DateRangeRequired));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_compliance_report() {
        let now = Utc::now();
        let store = store_with(&[
            ("login", Some(1), now - Duration::days(1)),
            ("login_failed", Some(2), now - Duration::days(1)),
            ("user_deleted", Some(1), now - Duration::hours(5)),
            ("bulk_delete", Some(3), now - Duration::hours(2)),
            ("ip_blocked", None, now - Duration::hours(1)),
            ("backup_failed", None, now - Duration::hours(1)),
            ("tenant_deleted", Some(4), now - Duration::days(40)),
        ]);
        let analytics = ActivityAnalytics::new(store);

        let report = analytics
            .generate_compliance_report(&ComplianceRequest::new(now - Duration::days(7), now))
            .await
            .unwrap();

        assert_eq!(report.total_activities, 6);
        assert_eq!(report.failed_activities, 2);
        assert_eq!(report.unique_actors, 3);
        assert_eq!(report.security_events, 1);
        assert_eq!(report.by_severity[&Severity::Critical], 2);
        let critical: Vec<&str> = report
            .critical_events
            .iter()
            .map(|l| l.action.as_str())
            .collect();
        assert_eq!(critical, vec!["bulk_delete", "user_deleted"]);
    }
}
