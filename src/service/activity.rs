use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Whether an observation counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityMode {
    /// Refresh `last_activity` and create a record on first sight.
    Refresh,
    /// Detect expiry only. Never creates or refreshes a record.
    Observe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackResult {
    /// No identity was presented, or an observing call found no record.
    Untracked,
    /// First sighting; a record was created.
    Started,
    Active { remaining: Duration },
    /// The record was idle past the timeout and has been removed.
    SessionExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub is_active: bool,
    pub remaining: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idle {
    Within { remaining: Duration },
    Exceeded,
}

/// The single place where idle time is compared against the timeout.
fn assess(last_activity: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> Idle {
    // A clock step backwards counts as no idle time.
    let elapsed = (now - last_activity).to_std().unwrap_or(Duration::ZERO);
    if elapsed > timeout {
        Idle::Exceeded
    } else {
        Idle::Within {
            remaining: timeout - elapsed,
        }
    }
}

/// Process-wide `username -> last activity` store.
///
/// All reads and writes go through one lock, so each operation's
/// read-compare-write-or-delete happens as a single step.
#[derive(Debug)]
pub struct ActivityTracker {
    timeout: Duration,
    sweep_interval: Duration,
    records: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ActivityTracker {
    pub fn new(timeout: Duration, sweep_interval: Duration) -> Self {
        Self {
            timeout,
            sweep_interval: sweep_interval.max(Duration::from_secs(1)),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn touch(&self, identity: Option<&str>, mode: ActivityMode) -> TrackResult {
        self.touch_at(identity, mode, Utc::now()).await
    }

    pub(crate) async fn touch_at(&self, identity: Option<&str>, mode: ActivityMode, now: DateTime<Utc>) -> TrackResult {
        let Some(username) = identity else {
            return TrackResult::Untracked;
        };

        let mut records = self.records.lock().await;
        let Some(last_activity) = records.get_mut(username) else {
            return match mode {
                ActivityMode::Refresh => {
                    records.insert(username.to_string(), now);
                    debug!(username = %username, "activity tracking started");
                    TrackResult::Started
                }
                ActivityMode::Observe => TrackResult::Untracked,
            };
        };

        match assess(*last_activity, now, self.timeout) {
            Idle::Exceeded => {
                records.remove(username);
                info!(username = %username, "session expired due to inactivity");
                TrackResult::SessionExpired
            }
            Idle::Within { remaining } => match mode {
                ActivityMode::Refresh => {
                    *last_activity = now;
                    TrackResult::Active { remaining: self.timeout }
                }
                ActivityMode::Observe => TrackResult::Active { remaining },
            },
        }
    }

    /// Called on login: always (re)creates the record.
    pub async fn start(&self, username: &str) {
        self.start_at(username, Utc::now()).await;
    }

    pub(crate) async fn start_at(&self, username: &str, now: DateTime<Utc>) {
        self.records.lock().await.insert(username.to_string(), now);
    }

    /// Called on logout. Returns whether a record existed.
    pub async fn end(&self, username: &str) -> bool {
        self.records.lock().await.remove(username).is_some()
    }

    /// Read-only check that does not count as activity. An expired record is removed.
    pub async fn status(&self, username: &str) -> Option<SessionStatus> {
        self.status_at(username, Utc::now()).await
    }

    pub(crate) async fn status_at(&self, username: &str, now: DateTime<Utc>) -> Option<SessionStatus> {
        match self.touch_at(Some(username), ActivityMode::Observe, now).await {
            TrackResult::Untracked | TrackResult::Started => None,
            TrackResult::Active { remaining } => Some(SessionStatus {
                is_active: true,
                remaining,
            }),
            TrackResult::SessionExpired => Some(SessionStatus {
                is_active: false,
                remaining: Duration::ZERO,
            }),
        }
    }

    pub async fn last_activity(&self, username: &str) -> Option<DateTime<Utc>> {
        self.records.lock().await.get(username).copied()
    }

    /// Drops every record idle past the timeout. Returns how many were removed.
    pub(crate) async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.timeout;
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, last_activity| matches!(assess(*last_activity, now, timeout), Idle::Within { .. }));
        before - records.len()
    }

    pub fn spawn_sweep_task(self: Arc<Self>) {
        let sweep_interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                let removed = self.sweep_at(Utc::now()).await;
                if removed > 0 {
                    debug!(removed = removed, "swept idle sessions");
                }
            }
        });
    }
}
