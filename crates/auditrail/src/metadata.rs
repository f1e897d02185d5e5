//! Metadata enrichment and redaction.
//!
//! Every written activity carries an automatically derived metadata object
//! (classification, action info, process info, request context) merged
//! underneath whatever the caller supplied. Caller keys win on conflict.

use crate::categorize::{is_valid_action, Categorization};
use crate::error::{AuditError, Result};
use crate::event::{ActivityRecord, NewActivity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Maximum serialized metadata size (1 MiB).
pub const MAX_METADATA_BYTES: usize = 1024 * 1024;

/// Replacement value for redacted entries.
pub const REDACTED: &str = "[REDACTED]";

/// Normalized key fragments that mark a value as sensitive.
const SENSITIVE_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "credential",
    "apikey",
    "privatekey",
    "accesskey",
    "signingkey",
    "encryptionkey",
    "authorization",
    "cookie",
    "creditcard",
    "cardnumber",
];

/// Short names matched as a whole segment of the key.
const SENSITIVE_SEGMENTS: &[&str] = &["key", "pwd", "pin", "cvv", "ssn"];

/// Split a key on `_`, `-`, `.`, spaces and lower-to-upper camelCase
/// boundaries, lowercasing each segment.
fn key_segments(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in key.chars() {
        if matches!(c, '_' | '-' | '.' | ' ') {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Whether a metadata key names sensitive data.
///
/// Matching ignores case, `_` and `-`, so `api_key`, `apiKey` and `API-KEY`
/// are all sensitive. Short names such as `key` or `ssn` must be a whole
/// segment: `ssh_key` and `masterKey` match, `monkey` does not.
pub fn is_sensitive_key(key: &str) -> bool {
    let segments = key_segments(key);
    if segments
        .iter()
        .any(|segment| SENSITIVE_SEGMENTS.contains(&segment.as_str()))
    {
        return true;
    }

    let normalized = segments.concat();
    SENSITIVE_FRAGMENTS
        .iter()
        .any(|fragment| normalized.contains(fragment))
}

/// Return a copy of `value` with every sensitive key's value redacted.
///
/// Walks nested objects and arrays to any depth. The input is untouched.
pub fn sanitize_metadata(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_metadata).collect()),
        other => other.clone(),
    }
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                Value::String(REDACTED.to_string())
            } else {
                sanitize_metadata(value)
            };
            (key.clone(), value)
        })
        .collect()
}

/// Reject metadata whose serialized form exceeds `limit` bytes.
///
/// `serde_json::Value` is an owned tree, so cycles cannot occur; anything
/// that fails to serialize is reported as invalid JSON.
pub fn validate_metadata(metadata: &Map<String, Value>, limit: usize) -> Result<()> {
    let size = serde_json::to_vec(metadata)
        .map_err(|e| AuditError::InvalidJson(e.to_string()))?
        .len();
    if size > limit {
        return Err(AuditError::MetadataTooLarge { size, limit });
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AutoMetadata {
    timestamp: DateTime<Utc>,
    categorization: Categorization,
    action_info: ActionInfo,
    system_info: SystemInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_info: Option<RequestInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionInfo {
    is_known_action: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemInfo {
    pid: u32,
    os: &'static str,
    arch: &'static str,
    runtime: &'static str,
    version: &'static str,
}

impl SystemInfo {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            runtime: "rust",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

impl RequestInfo {
    /// Present only when at least one field is non-empty.
    fn from_activity(activity: &NewActivity) -> Option<Self> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        let info = Self {
            user_agent: non_empty(&activity.user_agent),
            ip_address: non_empty(&activity.ip_address),
            session_id: non_empty(&activity.session_id),
        };
        if info.user_agent.is_none() && info.ip_address.is_none() && info.session_id.is_none() {
            None
        } else {
            Some(info)
        }
    }
}

/// Classify `activity` and merge automatic metadata under the caller's.
///
/// Caller metadata is redacted with [`sanitize_metadata`] before the merge;
/// on a top-level key conflict the caller's value wins. Fails only if the
/// automatic metadata cannot be serialized.
pub fn collect_metadata(activity: NewActivity) -> Result<ActivityRecord> {
    let categorization = Categorization::resolve(
        &activity.action,
        activity.category,
        activity.severity,
        activity.status,
    );

    let auto = AutoMetadata {
        timestamp: Utc::now(),
        categorization,
        action_info: ActionInfo {
            is_known_action: is_valid_action(&activity.action),
        },
        system_info: SystemInfo::current(),
        request_info: RequestInfo::from_activity(&activity),
    };

    let mut merged = match serde_json::to_value(&auto)? {
        Value::Object(map) => map,
        other => {
            return Err(AuditError::InvalidJson(format!(
                "automatic metadata is not an object: {other}"
            )))
        }
    };
    if let Some(ref caller) = activity.metadata {
        for (key, value) in sanitize_map(caller) {
            merged.insert(key, value);
        }
    }

    Ok(ActivityRecord {
        user_id: activity.user_id,
        session_id: activity.session_id,
        action: activity.action,
        resource_type: activity.resource_type,
        resource_id: activity.resource_id,
        resource_uuid: activity.resource_uuid,
        description: activity.description,
        category: categorization.category,
        severity: categorization.severity,
        status: categorization.status,
        old_values: activity.old_values,
        new_values: activity.new_values,
        metadata: Some(merged),
        ip_address: activity.ip_address,
        user_agent: activity.user_agent,
    })
}
