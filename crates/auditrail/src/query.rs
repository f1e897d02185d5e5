//! Store-level queries.
//!
//! A [`StoreQuery`] is the parameterized form every store executes: a list of
//! predicates, an ordering, a page window and the actor-join flag. User input
//! only ever lands in predicate values, never in field names, and sort fields
//! come from the closed [`SortField`] set.

use crate::event::{ActivityLog, Category, Severity};
use crate::filter::{ActivityQuery, SortField, SortOrder};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Columns a predicate can compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    UserId,
    SessionId,
    Action,
    ResourceType,
    ResourceId,
    ResourceUuid,
    Description,
    Category,
    Severity,
    Status,
    IpAddress,
}

/// Fields covered by free-text search.
pub const SEARCH_FIELDS: [Field; 6] = [
    Field::Description,
    Field::Action,
    Field::ResourceType,
    Field::Category,
    Field::Severity,
    Field::Status,
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Category> for FieldValue {
    fn from(value: Category) -> Self {
        FieldValue::Text(value.as_str().to_string())
    }
}

impl From<Severity> for FieldValue {
    fn from(value: Severity) -> Self {
        FieldValue::Text(value.as_str().to_string())
    }
}

impl From<crate::event::Status> for FieldValue {
    fn from(value: crate::event::Status) -> Self {
        FieldValue::Text(value.as_str().to_string())
    }
}

impl Field {
    /// Read this column from a stored entry.
    pub fn extract(&self, log: &ActivityLog) -> Option<FieldValue> {
        match self {
            Field::Id => Some(FieldValue::Int(log.id)),
            Field::UserId => log.user_id.map(FieldValue::Int),
            Field::SessionId => log.session_id.as_deref().map(FieldValue::from),
            Field::Action => Some(FieldValue::from(log.action.as_str())),
            Field::ResourceType => Some(FieldValue::from(log.resource_type.as_str())),
            Field::ResourceId => log.resource_id.map(FieldValue::Int),
            Field::ResourceUuid => log.resource_uuid.as_deref().map(FieldValue::from),
            Field::Description => Some(FieldValue::from(log.description.as_str())),
            Field::Category => Some(FieldValue::from(log.category)),
            Field::Severity => Some(FieldValue::from(log.severity)),
            Field::Status => Some(FieldValue::from(log.status)),
            Field::IpAddress => log.ip_address.as_deref().map(FieldValue::from),
        }
    }

    fn text<'a>(&self, log: &'a ActivityLog) -> Option<&'a str> {
        match self {
            Field::SessionId => log.session_id.as_deref(),
            Field::Action => Some(log.action.as_str()),
            Field::ResourceType => Some(log.resource_type.as_str()),
            Field::ResourceUuid => log.resource_uuid.as_deref(),
            Field::Description => Some(log.description.as_str()),
            Field::Category => Some(log.category.as_str()),
            Field::Severity => Some(log.severity.as_str()),
            Field::Status => Some(log.status.as_str()),
            Field::IpAddress => log.ip_address.as_deref(),
            Field::Id | Field::UserId | Field::ResourceId => None,
        }
    }
}

/// A single condition; a query matches when all of its predicates do.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Field, FieldValue),
    /// `created_at >= bound`
    CreatedFrom(DateTime<Utc>),
    /// `created_at <= bound`
    CreatedTo(DateTime<Utc>),
    /// Case-insensitive substring match on any of [`SEARCH_FIELDS`].
    Search(String),
}

impl Predicate {
    pub fn matches(&self, log: &ActivityLog) -> bool {
        match self {
            Predicate::Eq(field, value) => field.extract(log).as_ref() == Some(value),
            Predicate::CreatedFrom(from) => log.created_at >= *from,
            Predicate::CreatedTo(to) => log.created_at <= *to,
            Predicate::Search(term) => {
                let needle = term.to_lowercase();
                SEARCH_FIELDS.iter().any(|field| {
                    field
                        .text(log)
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
        }
    }
}

/// A parameterized query a store can execute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreQuery {
    pub predicates: Vec<Predicate>,
    /// `None` leaves store order (insertion order).
    pub order: Option<(SortField, SortOrder)>,
    pub offset: usize,
    pub limit: Option<usize>,
    /// Attach the actor record to each result.
    pub include_user: bool,
}

impl StoreQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.predicates.push(Predicate::Eq(field, value.into()));
        self
    }

    pub fn created_from(mut self, from: DateTime<Utc>) -> Self {
        self.predicates.push(Predicate::CreatedFrom(from));
        self
    }

    pub fn created_to(mut self, to: DateTime<Utc>) -> Self {
        self.predicates.push(Predicate::CreatedTo(to));
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.predicates.push(Predicate::Search(term.into()));
        self
    }

    pub fn order_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.order = Some((field, order));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_user(mut self, include: bool) -> Self {
        self.include_user = include;
        self
    }

    /// Check if an entry satisfies every predicate.
    pub fn matches(&self, log: &ActivityLog) -> bool {
        self.predicates.iter().all(|p| p.matches(log))
    }

    /// Same predicates, without ordering, paging or join.
    pub fn count_query(&self) -> StoreQuery {
        StoreQuery {
            predicates: self.predicates.clone(),
            ..Default::default()
        }
    }

    /// Filter, sort and page an in-memory set of entries.
    pub fn apply<'a, I>(&self, logs: I) -> Vec<ActivityLog>
    where
        I: IntoIterator<Item = &'a ActivityLog>,
    {
        let mut results: Vec<ActivityLog> =
            logs.into_iter().filter(|l| self.matches(l)).cloned().collect();

        if let Some((field, order)) = self.order {
            results.sort_by(|a, b| {
                let ord = compare(field, a, b).then_with(|| a.id.cmp(&b.id));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        let results = results.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => results.take(limit).collect(),
            None => results.collect(),
        }
    }
}

/// Severity sorts by rank, other text columns lexically.
fn compare(field: SortField, a: &ActivityLog, b: &ActivityLog) -> Ordering {
    match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Action => a.action.cmp(&b.action),
        SortField::ResourceType => a.resource_type.cmp(&b.resource_type),
        SortField::Severity => a.severity.cmp(&b.severity),
        SortField::Category => a.category.as_str().cmp(b.category.as_str()),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

/// Predicates for every filter set in `query`.
fn predicates(query: &ActivityQuery) -> Vec<Predicate> {
    let mut q = StoreQuery::new();
    if let Some(user_id) = query.user_id {
        q = q.eq(Field::UserId, user_id);
    }
    if let Some(ref session_id) = query.session_id {
        q = q.eq(Field::SessionId, session_id.as_str());
    }
    if let Some(ref action) = query.action {
        q = q.eq(Field::Action, action.as_str());
    }
    if let Some(ref resource_type) = query.resource_type {
        q = q.eq(Field::ResourceType, resource_type.as_str());
    }
    if let Some(resource_id) = query.resource_id {
        q = q.eq(Field::ResourceId, resource_id);
    }
    if let Some(ref uuid) = query.resource_uuid {
        q = q.eq(Field::ResourceUuid, uuid.as_str());
    }
    if let Some(category) = query.category {
        q = q.eq(Field::Category, category);
    }
    if let Some(severity) = query.severity {
        q = q.eq(Field::Severity, severity);
    }
    if let Some(status) = query.status {
        q = q.eq(Field::Status, status);
    }
    if let Some(ref ip) = query.ip_address {
        q = q.eq(Field::IpAddress, ip.as_str());
    }
    if let Some(from) = query.date_from {
        q = q.created_from(from);
    }
    if let Some(to) = query.date_to {
        q = q.created_to(to);
    }
    if let Some(ref term) = query.search {
        q = q.search(term.as_str());
    }
    q.predicates
}

/// The paged, ordered store query for a normalized filter.
pub fn build_query(query: &ActivityQuery) -> StoreQuery {
    StoreQuery {
        predicates: predicates(query),
        order: Some((query.sort_by, query.sort_order)),
        offset: query.offset(),
        limit: Some(query.limit as usize),
        include_user: query.include_user,
    }
}

/// The matching count query: same predicates, no paging.
pub fn build_count_query(query: &ActivityQuery) -> StoreQuery {
    StoreQuery {
        predicates: predicates(query),
        ..Default::default()
    }
}

/// Page metadata returned alongside a result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(limit as u64)
        };
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: (page as u64) < total_pages,
            has_previous: page > 1,
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Time bucket used by grouped counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl Granularity {
    /// Bucket label for a timestamp. Labels sort chronologically.
    ///
    /// | granularity | label              |
    /// |-------------|--------------------|
    /// | hour        | `2024-03-05 14:00` |
    /// | day         | `2024-03-05`       |
    /// | week        | `2024-W10` (ISO)   |
    /// | month       | `2024-03`          |
    /// | year        | `2024`             |
    pub fn bucket(&self, at: DateTime<Utc>) -> String {
        match self {
            Granularity::Hour => format!("{} {:02}:00", at.format("%Y-%m-%d"), at.hour()),
            Granularity::Day => at.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week = at.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => at.format("%Y-%m").to_string(),
            Granularity::Year => at.format("%Y").to_string(),
        }
    }
}

/// Dimensions a grouped count can split on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Period(Granularity),
    Category,
    Severity,
    Status,
    /// Acting user id; system events group under an empty key.
    Actor,
}

impl GroupKey {
    fn label(&self, log: &ActivityLog) -> String {
        match self {
            GroupKey::Period(granularity) => granularity.bucket(log.created_at),
            GroupKey::Category => log.category.as_str().to_string(),
            GroupKey::Severity => log.severity.as_str().to_string(),
            GroupKey::Status => log.status.as_str().to_string(),
            GroupKey::Actor => log.user_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }
}

/// One grouped count; `keys` line up with the requested [`GroupKey`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub keys: Vec<String>,
    pub count: u64,
}

/// Count matching entries per distinct key tuple, ordered by key.
pub fn group_logs<'a, I>(query: &StoreQuery, logs: I, keys: &[GroupKey]) -> Vec<GroupRow>
where
    I: IntoIterator<Item = &'a ActivityLog>,
{
    let mut groups: BTreeMap<Vec<String>, u64> = BTreeMap::new();
    for log in logs.into_iter().filter(|l| query.matches(l)) {
        let key = keys.iter().map(|k| k.label(log)).collect();
        *groups.entry(key).or_default() += 1;
    }
    groups
        .into_iter()
        .map(|(keys, count)| GroupRow { keys, count })
        .collect()
}
