//! Action categorization.
//!
//! Every known action identifier maps to exactly one [`ActionKind`], which in
//! turn carries its category, default severity and default status. Anything
//! else resolves to `system` / `low` / `success`.
//!
//! Matching is exact and case-sensitive: `"Login"` is not `"login"`.

use crate::event::{Category, Severity, Status};
use serde::{Deserialize, Serialize};

macro_rules! action_kinds {
    ($($variant:ident => $name:literal, $category:ident, $severity:ident, $status:ident;)+) => {
        /// A known action identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ActionKind {
            $($variant,)+
        }

        impl ActionKind {
            /// Every known action.
            pub const ALL: &'static [ActionKind] = &[$(ActionKind::$variant,)+];

            /// Look up an action identifier.
            pub fn from_action(action: &str) -> Option<Self> {
                match action {
                    $($name => Some(ActionKind::$variant),)+
                    _ => None,
                }
            }

            /// The wire identifier of this action.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ActionKind::$variant => $name,)+
                }
            }

            pub fn category(&self) -> Category {
                match self {
                    $(ActionKind::$variant => Category::$category,)+
                }
            }

            pub fn default_severity(&self) -> Severity {
                match self {
                    $(ActionKind::$variant => Severity::$severity,)+
                }
            }

            pub fn default_status(&self) -> Status {
                match self {
                    $(ActionKind::$variant => Status::$status,)+
                }
            }
        }
    };
}

action_kinds! {
    // authentication
    Login => "login", Authentication, Low, Success;
    Logout => "logout", Authentication, Low, Success;
    LoginFailed => "login_failed", Authentication, High, Failure;
    PasswordChanged => "password_changed", Authentication, Medium, Success;
    PasswordResetRequested => "password_reset_requested", Authentication, Medium, Success;
    PasswordReset => "password_reset", Authentication, High, Success;
    PasswordResetFailed => "password_reset_failed", Authentication, High, Failure;
    TwoFactorEnabled => "two_factor_enabled", Authentication, Medium, Success;
    TwoFactorDisabled => "two_factor_disabled", Authentication, High, Success;
    TwoFactorVerified => "two_factor_verified", Authentication, Low, Success;
    TwoFactorFailed => "two_factor_failed", Authentication, High, Failure;
    SessionExpired => "session_expired", Authentication, Low, Success;
    TokenRefreshed => "token_refreshed", Authentication, Low, Success;
    EmailVerified => "email_verified", Authentication, Low, Success;

    // authorization
    PermissionGranted => "permission_granted", Authorization, High, Success;
    PermissionRevoked => "permission_revoked", Authorization, High, Success;
    RoleCreated => "role_created", Authorization, Medium, Success;
    RoleUpdated => "role_updated", Authorization, Medium, Success;
    RoleDeleted => "role_deleted", Authorization, High, Success;
    RoleAssigned => "role_assigned", Authorization, High, Success;
    RoleRemoved => "role_removed", Authorization, High, Success;
    AccessDenied => "access_denied", Authorization, High, Failure;
    UnauthorizedAccess => "unauthorized_access", Authorization, Critical, Failure;

    // user management
    UserCreated => "user_created", UserManagement, Medium, Success;
    UserUpdated => "user_updated", UserManagement, Medium, Success;
    UserDeleted => "user_deleted", UserManagement, Critical, Success;
    UserActivated => "user_activated", UserManagement, Medium, Success;
    UserDeactivated => "user_deactivated", UserManagement, Medium, Success;
    UserSuspended => "user_suspended", UserManagement, High, Success;
    UserInvited => "user_invited", UserManagement, Medium, Success;
    ProfileUpdated => "profile_updated", UserManagement, Low, Success;

    // data modification
    Create => "create", DataModification, Low, Success;
    Update => "update", DataModification, Low, Success;
    Delete => "delete", DataModification, High, Success;
    RecordCreated => "record_created", DataModification, Low, Success;
    RecordUpdated => "record_updated", DataModification, Low, Success;
    RecordDeleted => "record_deleted", DataModification, High, Success;
    BulkUpdate => "bulk_update", DataModification, Medium, Success;
    BulkDelete => "bulk_delete", DataModification, Critical, Success;
    DataExported => "data_exported", DataModification, High, Success;
    DataImported => "data_imported", DataModification, Medium, Success;
    FileUploaded => "file_uploaded", DataModification, Low, Success;
    FileDeleted => "file_deleted", DataModification, High, Success;

    // system
    SystemStartup => "system_startup", System, Low, Success;
    SystemShutdown => "system_shutdown", System, Medium, Success;
    SystemError => "system_error", System, High, Error;
    ConfigChanged => "config_changed", System, High, Success;
    BackupCreated => "backup_created", System, Low, Success;
    BackupFailed => "backup_failed", System, High, Error;
    BackupRestored => "backup_restored", System, Critical, Success;
    MaintenanceStarted => "maintenance_started", System, Medium, Success;
    MaintenanceCompleted => "maintenance_completed", System, Low, Success;
    CacheCleared => "cache_cleared", System, Low, Success;
    MigrationRun => "migration_run", System, Medium, Success;
    MigrationFailed => "migration_failed", System, High, Error;
    TenantCreated => "tenant_created", System, Medium, Success;
    TenantUpdated => "tenant_updated", System, Medium, Success;
    TenantDeleted => "tenant_deleted", System, Critical, Success;

    // security
    SuspiciousActivity => "suspicious_activity", Security, High, Success;
    BruteForceDetected => "brute_force_detected", Security, Critical, Success;
    AccountLocked => "account_locked", Security, High, Success;
    AccountUnlocked => "account_unlocked", Security, Medium, Success;
    IpBlocked => "ip_blocked", Security, High, Success;
    RateLimitExceeded => "rate_limit_exceeded", Security, Medium, Success;
    SecurityAlert => "security_alert", Security, Critical, Success;
    ApiKeyCreated => "api_key_created", Security, High, Success;
    ApiKeyRevoked => "api_key_revoked", Security, High, Success;
    CsrfViolation => "csrf_violation", Security, High, Failure;
}

/// Result of classifying an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categorization {
    pub category: Category,
    pub severity: Severity,
    pub status: Status,
}

impl Default for Categorization {
    /// The classification of an unknown action.
    fn default() -> Self {
        Self {
            category: Category::System,
            severity: Severity::Low,
            status: Status::Success,
        }
    }
}

impl Categorization {
    /// Derive the full triple for an action identifier.
    pub fn for_action(action: &str) -> Self {
        match ActionKind::from_action(action) {
            Some(kind) => Self {
                category: kind.category(),
                severity: kind.default_severity(),
                status: kind.default_status(),
            },
            None => Self::default(),
        }
    }

    /// Fill any unset dimension from the action; explicit values win.
    pub fn resolve(
        action: &str,
        category: Option<Category>,
        severity: Option<Severity>,
        status: Option<Status>,
    ) -> Self {
        let derived = Self::for_action(action);
        Self {
            category: category.unwrap_or(derived.category),
            severity: severity.unwrap_or(derived.severity),
            status: status.unwrap_or(derived.status),
        }
    }
}

/// Category of an action; `system` when unknown or empty.
pub fn detect_category(action: &str) -> Category {
    ActionKind::from_action(action)
        .map(|kind| kind.category())
        .unwrap_or(Category::System)
}

/// Default severity of an action; `low` when unknown.
pub fn severity_for_action(action: &str) -> Severity {
    ActionKind::from_action(action)
        .map(|kind| kind.default_severity())
        .unwrap_or(Severity::Low)
}

/// Default status of an action; `success` when unknown.
pub fn status_for_action(action: &str) -> Status {
    ActionKind::from_action(action)
        .map(|kind| kind.default_status())
        .unwrap_or(Status::Success)
}

/// Whether `action` is one of the known action identifiers.
pub fn is_valid_action(action: &str) -> bool {
    ActionKind::from_action(action).is_some()
}
