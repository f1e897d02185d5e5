//! Real-time activity monitoring.
//!
//! [`RealTimeMonitor`] keeps a bounded ring buffer of the most recent
//! entries and evaluates two sliding-window detectors on every ingest:
//!
//! - **burst**: at least `burst_threshold` entries inside `burst_window`
//! - **failure streak**: at least `failure_threshold` failed entries for the
//!   same action inside `failure_window`
//!
//! Once a detector fires, the same detector (and action, for streaks) stays
//! quiet until its window has elapsed.
//!
//! Buffer updates and detector evaluation happen under one lock; subscriber
//! callbacks run after it is released, so a callback may call back into the
//! monitor. A panicking callback is logged and does not affect the others.

use crate::config::MonitorConfig;
use crate::event::{ActivityLog, Severity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration as StdDuration;

/// Callback invoked for every ingested entry.
pub type ActivityCallback = Arc<dyn Fn(&ActivityLog) + Send + Sync>;

/// Callback invoked for every raised alert.
pub type AlertCallback = Arc<dyn Fn(&SecurityAlert) + Send + Sync>;

/// Handle returned by subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Overall activity volume exceeded the burst threshold.
    Burst,
    /// Repeated failures of a single action.
    FailureStreak,
}

/// A security alert raised by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// Matching entries in the window when the alert fired.
    pub count: usize,
    pub threshold: usize,
    pub window_secs: u64,
    /// The action behind a failure streak.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Entry whose ingest triggered the alert.
    pub event_id: i64,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DetectorKey {
    Burst,
    Streak(String),
}

#[derive(Default)]
struct MonitorState {
    buffer: VecDeque<ActivityLog>,
    last_fired: HashMap<DetectorKey, DateTime<Utc>>,
}

impl MonitorState {
    fn count_within(
        &self,
        window: StdDuration,
        now: DateTime<Utc>,
        pred: impl Fn(&ActivityLog) -> bool,
    ) -> usize {
        let cutoff = window_start(now, window);
        self.buffer
            .iter()
            .filter(|e| e.created_at >= cutoff && e.created_at <= now && pred(e))
            .count()
    }

    /// Record a firing unless the detector already fired within `window`.
    fn try_fire(&mut self, key: DetectorKey, now: DateTime<Utc>, window: StdDuration) -> bool {
        let suppressed = self.last_fired.get(&key).is_some_and(|last| {
            (now - *last)
                .to_std()
                .map(|elapsed| elapsed < window)
                .unwrap_or(true)
        });
        if !suppressed {
            self.last_fired.insert(key, now);
        }
        !suppressed
    }
}

fn window_start(now: DateTime<Utc>, window: StdDuration) -> DateTime<Utc> {
    Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn remove_subscription<T>(callbacks: &RwLock<Vec<(SubscriptionId, T)>>, id: SubscriptionId) -> bool {
    let mut callbacks = callbacks.write().unwrap_or_else(PoisonError::into_inner);
    let before = callbacks.len();
    callbacks.retain(|(sub, _)| *sub != id);
    callbacks.len() != before
}

/// Sliding-window monitor over recently logged activity.
pub struct RealTimeMonitor {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    activity_callbacks: RwLock<Vec<(SubscriptionId, ActivityCallback)>>,
    alert_callbacks: RwLock<Vec<(SubscriptionId, AlertCallback)>>,
    next_subscription: AtomicU64,
}

impl Default for RealTimeMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl RealTimeMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                buffer: VecDeque::with_capacity(config.buffer_capacity.min(1024)),
                last_fired: HashMap::new(),
            }),
            config,
            activity_callbacks: RwLock::new(Vec::new()),
            alert_callbacks: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe to every ingested entry.
    pub fn on_activity<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ActivityLog) + Send + Sync + 'static,
    {
        let id = self.next_id();
        let callback: ActivityCallback = Arc::new(callback);
        self.activity_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    /// Subscribe to raised alerts.
    pub fn on_alert<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SecurityAlert) + Send + Sync + 'static,
    {
        let id = self.next_id();
        let callback: AlertCallback = Arc::new(callback);
        self.alert_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let activity = remove_subscription(&self.activity_callbacks, id);
        let alert = remove_subscription(&self.alert_callbacks, id);
        activity || alert
    }

    /// Ingest an entry, notify subscribers and return any alerts raised.
    pub fn monitor_real_time_activity(&self, event: &ActivityLog) -> Vec<SecurityAlert> {
        self.monitor_activity_at(event, Utc::now())
    }

    /// Like [`monitor_real_time_activity`](Self::monitor_real_time_activity),
    /// evaluating windows as of `now`. Used when replaying history.
    pub fn monitor_activity_at(&self, event: &ActivityLog, now: DateTime<Utc>) -> Vec<SecurityAlert> {
        let alerts = self.ingest(event, now);

        let activity_callbacks: Vec<ActivityCallback> = self
            .activity_callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in activity_callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(event_id = event.id, "Activity subscriber panicked");
            }
        }

        if !alerts.is_empty() {
            let alert_callbacks: Vec<AlertCallback> = self
                .alert_callbacks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect();
            for alert in &alerts {
                for callback in &alert_callbacks {
                    if catch_unwind(AssertUnwindSafe(|| callback(alert))).is_err() {
                        tracing::error!(kind = ?alert.kind, "Alert subscriber panicked");
                    }
                }
            }
        }

        alerts
    }

    /// Append to the buffer and run the detectors in one critical section.
    fn ingest(&self, event: &ActivityLog, now: DateTime<Utc>) -> Vec<SecurityAlert> {
        let mut alerts = Vec::new();
        let mut state = self.lock_state();

        state.buffer.push_back(event.clone());
        while state.buffer.len() > self.config.buffer_capacity {
            state.buffer.pop_front();
        }

        let burst_count = state.count_within(self.config.burst_window, now, |_| true);
        if burst_count >= self.config.burst_threshold
            && state.try_fire(DetectorKey::Burst, now, self.config.burst_window)
        {
            let alert = SecurityAlert {
                kind: AlertKind::Burst,
                severity: Severity::High,
                message: format!(
                    "{} activities in the last {}s (threshold {})",
                    burst_count,
                    self.config.burst_window.as_secs(),
                    self.config.burst_threshold
                ),
                count: burst_count,
                threshold: self.config.burst_threshold,
                window_secs: self.config.burst_window.as_secs(),
                action: None,
                event_id: event.id,
                triggered_at: now,
            };
            tracing::warn!(count = burst_count, "Activity burst detected");
            alerts.push(alert);
        }

        if event.is_failure() {
            let streak = state.count_within(self.config.failure_window, now, |e| {
                e.is_failure() && e.action == event.action
            });
            if streak >= self.config.failure_threshold
                && state.try_fire(
                    DetectorKey::Streak(event.action.clone()),
                    now,
                    self.config.failure_window,
                )
            {
                let alert = SecurityAlert {
                    kind: AlertKind::FailureStreak,
                    severity: Severity::Critical,
                    message: format!(
                        "{} failed `{}` attempts in the last {}s (threshold {})",
                        streak,
                        event.action,
                        self.config.failure_window.as_secs(),
                        self.config.failure_threshold
                    ),
                    count: streak,
                    threshold: self.config.failure_threshold,
                    window_secs: self.config.failure_window.as_secs(),
                    action: Some(event.action.clone()),
                    event_id: event.id,
                    triggered_at: now,
                };
                tracing::warn!(action = %event.action, count = streak, "Failure streak detected");
                alerts.push(alert);
            }
        }

        alerts
    }

    /// Whether the buffer holds at least `threshold` entries from the last
    /// `time_window_secs` seconds.
    pub fn detect_suspicious_activity(&self, time_window_secs: u64, threshold: usize) -> bool {
        let now = Utc::now();
        let state = self.lock_state();
        state.count_within(StdDuration::from_secs(time_window_secs), now, |_| true) >= threshold
    }

    /// The newest `limit` buffered entries, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<ActivityLog> {
        self.lock_state()
            .buffer
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn buffer_len(&self) -> usize {
        self.lock_state().buffer.len()
    }

    /// Clear the buffer and alert suppression. Subscriptions are kept.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.buffer.clear();
        state.last_fired.clear();
    }
}
