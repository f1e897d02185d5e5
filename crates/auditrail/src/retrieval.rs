//! Filtered, paginated reads.

use crate::error::{AuditError, Result};
use crate::event::{ActivityLog, Category, Severity};
use crate::filter::{normalize_filter, ActivityFilter, SortField, SortOrder, MAX_LIMIT};
use crate::query::{build_count_query, build_query, Field, Paginated, Pagination, StoreQuery};
use crate::store::ActivityStore;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Read side of the audit trail.
#[derive(Clone)]
pub struct ActivityRetrieval {
    store: Arc<dyn ActivityStore>,
}

impl ActivityRetrieval {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self { store }
    }

    /// One page of entries matching `filter`, with page metadata.
    ///
    /// The filter is normalized first, so this never fails on bad input.
    pub async fn get_activities(&self, filter: &ActivityFilter) -> Result<Paginated<ActivityLog>> {
        let query = normalize_filter(filter);
        let page_query = build_query(&query);
        let count_query = build_count_query(&query);

        let (data, total) = tokio::try_join!(
            self.store.query(&page_query),
            self.store.count(&count_query)
        )?;

        tracing::debug!(page = query.page, limit = query.limit, total, "Retrieved activities");

        Ok(Paginated {
            data,
            pagination: Pagination::new(query.page, query.limit, total),
        })
    }

    pub async fn get_activity_by_id(&self, id: i64, include_user: bool) -> Result<ActivityLog> {
        let query = StoreQuery::new()
            .eq(Field::Id, id)
            .limit(1)
            .with_user(include_user);
        self.store
            .query(&query)
            .await?
            .into_iter()
            .next()
            .ok_or(AuditError::NotFound(id))
    }

    /// The newest `limit` entries (capped at 1000).
    pub async fn get_recent_activities(&self, limit: u32, include_user: bool) -> Result<Vec<ActivityLog>> {
        let query = StoreQuery::new()
            .order_by(SortField::CreatedAt, SortOrder::Desc)
            .limit(limit.clamp(1, MAX_LIMIT) as usize)
            .with_user(include_user);
        self.store.query(&query).await
    }

    pub async fn get_activities_by_category(
        &self,
        category: Category,
        filter: &ActivityFilter,
    ) -> Result<Paginated<ActivityLog>> {
        let mut filter = filter.clone();
        filter.category = Some(category.as_str().to_string());
        self.get_activities(&filter).await
    }

    pub async fn get_activities_by_severity(
        &self,
        severity: Severity,
        filter: &ActivityFilter,
    ) -> Result<Paginated<ActivityLog>> {
        let mut filter = filter.clone();
        filter.severity = Some(severity.as_str().to_string());
        self.get_activities(&filter).await
    }

    /// Entries created within `[from, to]`.
    pub async fn get_activities_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: &ActivityFilter,
    ) -> Result<Paginated<ActivityLog>> {
        let mut filter = filter.clone();
        filter.date_from = Some(from.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        filter.date_to = Some(to.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        self.get_activities(&filter).await
    }

    /// Everything `user_id` did.
    pub async fn get_user_activities(
        &self,
        user_id: i64,
        filter: &ActivityFilter,
    ) -> Result<Paginated<ActivityLog>> {
        let mut filter = filter.clone();
        filter.user_id = Some(user_id);
        self.get_activities(&filter).await
    }

    /// The history of one resource.
    pub async fn get_resource_activities(
        &self,
        resource_type: &str,
        resource_id: i64,
        filter: &ActivityFilter,
    ) -> Result<Paginated<ActivityLog>> {
        let mut filter = filter.clone();
        filter.resource_type = Some(resource_type.to_string());
        filter.resource_id = Some(resource_id);
        self.get_activities(&filter).await
    }
}
