//! Field validation and log-safe projection of activities.

use crate::error::{AuditError, Result};
use crate::event::{Category, NewActivity, Severity, Status};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::sync::OnceLock;

pub const MAX_ACTION_LEN: usize = 100;
pub const MAX_RESOURCE_TYPE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_SESSION_ID_LEN: usize = 255;
pub const MAX_USER_AGENT_LEN: usize = 500;
pub const MAX_IP_ADDRESS_LEN: usize = 45;

static UUID_REGEX: OnceLock<Regex> = OnceLock::new();
static IPV4_REGEX: OnceLock<Regex> = OnceLock::new();

fn uuid_regex() -> &'static Regex {
    // Canonical 8-4-4-4-12 form, versions 1 through 5
    UUID_REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
        )
        .unwrap()
    })
}

fn ipv4_regex() -> &'static Regex {
    IPV4_REGEX.get_or_init(|| {
        Regex::new(
            r"^((25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])$",
        )
        .unwrap()
    })
}

/// Whether `value` is a canonical UUID of version 1-5.
pub fn is_valid_uuid(value: &str) -> bool {
    uuid_regex().is_match(value)
}

/// Whether `value` is a dotted-quad IPv4 or a plain IPv6 literal.
///
/// Zone identifiers (`fe80::1%eth0`) and bracketed forms are rejected.
pub fn is_valid_ip(value: &str) -> bool {
    if value.len() > MAX_IP_ADDRESS_LEN {
        return false;
    }
    ipv4_regex().is_match(value) || value.parse::<Ipv6Addr>().is_ok()
}

fn require(field: &str, value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AuditError::validation(field, format!("{label} is required")));
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize, label: &str) -> Result<()> {
    if value.chars().count() > max {
        return Err(AuditError::validation(
            field,
            format!("{label} must be at most {max} characters"),
        ));
    }
    Ok(())
}

fn positive(field: &str, value: Option<i64>, label: &str) -> Result<()> {
    match value {
        Some(v) if v <= 0 => Err(AuditError::validation(
            field,
            format!("{label} must be a positive integer"),
        )),
        _ => Ok(()),
    }
}

/// Validate an activity before it is written.
///
/// Checks run in a fixed order and the first failure is returned:
/// required fields, length limits, optional field formats, then positivity
/// of numeric identifiers.
pub fn validate_params(activity: &NewActivity) -> Result<()> {
    require("action", &activity.action, "Action")?;
    require("resource_type", &activity.resource_type, "Resource type")?;
    require("description", &activity.description, "Description")?;

    max_len("action", &activity.action, MAX_ACTION_LEN, "Action")?;
    max_len(
        "resource_type",
        &activity.resource_type,
        MAX_RESOURCE_TYPE_LEN,
        "Resource type",
    )?;
    max_len(
        "description",
        &activity.description,
        MAX_DESCRIPTION_LEN,
        "Description",
    )?;

    if let Some(ref uuid) = activity.resource_uuid {
        if !is_valid_uuid(uuid) {
            return Err(AuditError::validation(
                "resource_uuid",
                "Resource UUID must be a valid UUID",
            ));
        }
    }

    if let Some(ref ip) = activity.ip_address {
        if !is_valid_ip(ip) {
            return Err(AuditError::validation(
                "ip_address",
                "IP address must be a valid IPv4 or IPv6 address",
            ));
        }
    }

    if let Some(ref session_id) = activity.session_id {
        max_len("session_id", session_id, MAX_SESSION_ID_LEN, "Session ID")?;
    }

    if let Some(ref user_agent) = activity.user_agent {
        max_len("user_agent", user_agent, MAX_USER_AGENT_LEN, "User agent")?;
    }

    positive("resource_id", activity.resource_id, "Resource ID")?;
    positive("user_id", activity.user_id, "User ID")?;

    Ok(())
}

/// Log-safe projection of an activity.
///
/// Carries identity, classification and resource pointers only. Change
/// payloads, metadata, IP address and session id are deliberately absent
/// from the type, so they cannot reach an operational log through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedActivity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_uuid: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

/// Build the log-safe projection of `activity`.
pub fn sanitize_params(activity: &NewActivity) -> SanitizedActivity {
    SanitizedActivity {
        user_id: activity.user_id,
        action: activity.action.clone(),
        resource_type: activity.resource_type.clone(),
        resource_id: activity.resource_id,
        resource_uuid: activity.resource_uuid.clone(),
        description: activity.description.clone(),
        category: activity.category,
        severity: activity.severity,
        status: activity.status,
    }
}

/// Whether `data` survives a serialize/deserialize round trip.
pub fn validate_json<T: Serialize + ?Sized>(data: &T) -> bool {
    serde_json::to_string(data)
        .and_then(|json| serde_json::from_str::<serde_json::Value>(&json))
        .is_ok()
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The sanitized projection never carries payload or request-context keys.
        #[test]
        fn prop_sanitize_never_leaks(
            action in "[a-z_]{0,20}",
            secret in "[a-zA-Z0-9]{1,20}",
            ip in proptest::option::of("[0-9.]{7,15}"),
            session in proptest::option::of("[a-z0-9-]{1,30}"),
        ) {
            let mut activity = NewActivity::new(action, "resource", "desc")
                .changes(json!({"secret": secret.clone()}), json!({"secret": secret.clone()}))
                .meta("secret", secret);
            activity.ip_address = ip;
            activity.session_id = session;

            let value = serde_json::to_value(sanitize_params(&activity)).unwrap();
            let obj = value.as_object().unwrap();
            for key in ["old_values", "new_values", "metadata", "ip_address", "session_id"] {
                prop_assert!(!obj.contains_key(key));
            }
        }

        /// Missing required fields always fail validation.
        #[test]
        fn prop_blank_action_rejected(blank in "[ \t]{0,5}") {
            let activity = NewActivity::new(blank, "user", "desc");
            let err = validate_params(&activity).unwrap_err();
            prop_assert_eq!(err.field(), Some("action"));
        }
    }
}
