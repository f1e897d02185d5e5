//! Retrieval filter normalization.
//!
//! [`normalize_filter`] never fails. Invalid values are coerced to defaults
//! or dropped so callers always get a usable query:
//!
//! - `page < 1` becomes 1
//! - `limit <= 0` becomes 50, `limit > 1000` becomes 1000
//! - unknown sort fields become `created_at`, unknown orders become `desc`
//! - unparseable dates and out-of-domain category/severity/status are dropped
//! - blank strings count as absent

use crate::event::{Category, Severity, Status};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

/// Loosely typed retrieval criteria, as they arrive from a query string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityFilter {
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub resource_uuid: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub ip_address: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub include_user: Option<bool>,
}

impl ActivityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: i64) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn date_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.date_from = Some(from.into());
        self.date_to = Some(to.into());
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn page(mut self, page: i64, limit: i64) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: impl Into<String>) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = Some(order.into());
        self
    }

    pub fn include_user(mut self, include: bool) -> Self {
        self.include_user = Some(include);
        self
    }
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    #[default]
    CreatedAt,
    Action,
    ResourceType,
    Severity,
    Category,
    Status,
}

impl SortField {
    pub const ALL: [SortField; 7] = [
        SortField::Id,
        SortField::CreatedAt,
        SortField::Action,
        SortField::ResourceType,
        SortField::Severity,
        SortField::Category,
        SortField::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::CreatedAt => "created_at",
            SortField::Action => "action",
            SortField::ResourceType => "resource_type",
            SortField::Severity => "severity",
            SortField::Category => "category",
            SortField::Status => "status",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == value)
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// Case-insensitive `asc` / `desc`.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("asc") {
            Some(SortOrder::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Some(SortOrder::Desc)
        } else {
            None
        }
    }
}

/// Normalized, strongly typed retrieval criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityQuery {
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub resource_uuid: Option<String>,
    pub category: Option<Category>,
    pub severity: Option<Severity>,
    pub status: Option<Status>,
    pub ip_address: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub include_user: bool,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            session_id: None,
            action: None,
            resource_type: None,
            resource_id: None,
            resource_uuid: None,
            category: None,
            severity: None,
            status: None,
            ip_address: None,
            date_from: None,
            date_to: None,
            search: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            include_user: false,
        }
    }
}

impl ActivityQuery {
    /// Row offset of the first item on the current page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }

    /// Render back into the loose form. Normalizing the result is a no-op.
    pub fn to_filter(&self) -> ActivityFilter {
        ActivityFilter {
            user_id: self.user_id,
            session_id: self.session_id.clone(),
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id,
            resource_uuid: self.resource_uuid.clone(),
            category: self.category.map(|c| c.as_str().to_string()),
            severity: self.severity.map(|s| s.as_str().to_string()),
            status: self.status.map(|s| s.as_str().to_string()),
            ip_address: self.ip_address.clone(),
            date_from: self.date_from.map(format_date),
            date_to: self.date_to.map(format_date),
            search: self.search.clone(),
            page: Some(self.page as i64),
            limit: Some(self.limit as i64),
            sort_by: Some(self.sort_by.as_str().to_string()),
            sort_order: Some(self.sort_order.as_str().to_string()),
            include_user: Some(self.include_user),
        }
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC),
/// or a bare `YYYY-MM-DD`. A bare date used as an upper bound covers the
/// whole day.
fn parse_date(value: &str, bound: Bound) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let naive = match bound {
        Bound::Start => date.and_hms_opt(0, 0, 0),
        Bound::End => date.and_hms_nano_opt(23, 59, 59, 999_999_999),
    }?;
    Some(naive.and_utc())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_enum<T>(field: &str, value: &Option<String>, parse: fn(&str) -> Option<T>) -> Option<T> {
    let raw = non_blank(value)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        tracing::debug!(field, value = %raw, "Dropping out-of-domain filter value");
    }
    parsed
}

fn parse_bound(field: &str, value: &Option<String>, bound: Bound) -> Option<DateTime<Utc>> {
    let raw = non_blank(value)?;
    let parsed = parse_date(&raw, bound);
    if parsed.is_none() {
        tracing::debug!(field, value = %raw, "Dropping unparseable date filter");
    }
    parsed
}

/// Coerce a loose filter into a usable query.
pub fn normalize_filter(filter: &ActivityFilter) -> ActivityQuery {
    let page = match filter.page {
        Some(p) if p >= 1 => p.min(u32::MAX as i64) as u32,
        _ => DEFAULT_PAGE,
    };
    let limit = match filter.limit {
        Some(l) if l <= 0 => DEFAULT_LIMIT,
        Some(l) if l > MAX_LIMIT as i64 => MAX_LIMIT,
        Some(l) => l as u32,
        None => DEFAULT_LIMIT,
    };

    ActivityQuery {
        user_id: filter.user_id,
        session_id: non_blank(&filter.session_id),
        action: non_blank(&filter.action),
        resource_type: non_blank(&filter.resource_type),
        resource_id: filter.resource_id,
        resource_uuid: non_blank(&filter.resource_uuid),
        category: parse_enum("category", &filter.category, Category::parse),
        severity: parse_enum("severity", &filter.severity, Severity::parse),
        status: parse_enum("status", &filter.status, Status::parse),
        ip_address: non_blank(&filter.ip_address),
        date_from: parse_bound("date_from", &filter.date_from, Bound::Start),
        date_to: parse_bound("date_to", &filter.date_to, Bound::End),
        search: non_blank(&filter.search),
        page,
        limit,
        sort_by: filter
            .sort_by
            .as_deref()
            .and_then(SortField::parse)
            .unwrap_or_default(),
        sort_order: filter
            .sort_order
            .as_deref()
            .and_then(SortOrder::parse)
            .unwrap_or_default(),
        include_user: filter.include_user.unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let q = normalize_filter(&ActivityFilter::new());
        assert_eq!(q, ActivityQuery::default());
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 50);
        assert_eq!(q.sort_by, SortField::CreatedAt);
        assert_eq!(q.sort_order, SortOrder::Desc);
        assert!(!q.include_user);
    }

    #[test]
    fn test_page_and_limit_coercion() {
        let q = normalize_filter(&ActivityFilter::new().page(0, 0));
        assert_eq!((q.page, q.limit), (1, 50));

        let q = normalize_filter(&ActivityFilter::new().page(-4, -1));
        assert_eq!((q.page, q.limit), (1, 50));

        let q = normalize_filter(&ActivityFilter::new().page(3, 5000));
        assert_eq!((q.page, q.limit), (3, 1000));

        let q = normalize_filter(&ActivityFilter::new().page(2, 25));
        assert_eq!((q.page, q.limit), (2, 25));
        assert_eq!(q.offset(), 25);
    }

    #[test]
    fn test_sort_coercion() {
        let q = normalize_filter(&ActivityFilter::new().sort("password", "sideways"));
        assert_eq!(q.sort_by, SortField::CreatedAt);
        assert_eq!(q.sort_order, SortOrder::Desc);

        let q = normalize_filter(&ActivityFilter::new().sort("severity", "ASC"));
        assert_eq!(q.sort_by, SortField::Severity);
        assert_eq!(q.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_enum_fields_dropped_when_invalid() {
        let q = normalize_filter(
            &ActivityFilter::new()
                .category("finance")
                .severity("urgent")
                .status("success"),
        );
        assert_eq!(q.category, None);
        assert_eq!(q.severity, None);
        assert_eq!(q.status, Some(Status::Success));
    }

    #[test]
    fn test_dates() {
        let q = normalize_filter(&ActivityFilter::new().date_range("2024-01-01", "2024-01-31"));
        assert_eq!(
            q.date_from,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        let to = q.date_to.unwrap();
        assert_eq!(to.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert!(to > Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap());

        let q = normalize_filter(
            &ActivityFilter::new().date_range("2024-03-10T12:00:00+02:00", "yesterday-ish"),
        );
        assert_eq!(
            q.date_from,
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap())
        );
        assert_eq!(q.date_to, None);
    }

    #[test]
    fn test_blank_strings_are_absent() {
        let mut filter = ActivityFilter::new().search("   ").action("");
        filter.ip_address = Some(" ".into());
        let q = normalize_filter(&filter);
        assert!(q.search.is_none());
        assert!(q.action.is_none());
        assert!(q.ip_address.is_none());
    }

    #[test]
    fn test_deserialize_from_loose_json() {
        let filter: ActivityFilter = serde_json::from_str(
            r#"{"category":"security","page":2,"limit":10,"sort_by":"id","include_user":true}"#,
        )
        .unwrap();
        let q = normalize_filter(&filter);
        assert_eq!(q.category, Some(Category::Security));
        assert_eq!(q.sort_by, SortField::Id);
        assert!(q.include_user);
    }
}
