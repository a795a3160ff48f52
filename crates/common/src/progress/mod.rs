//! Shared progress state for in-flight fetch runs
//!
//! One process-wide slot behind a single mutex. Writers hold the lock
//! only for the duration of one update; readers receive an owned
//! snapshot and never a reference into the live state.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::SourceKind;

/// Lifecycle status of one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Ok,
    Error,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStatus {
    pub status: RunStatus,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time copy of the progress slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub running: bool,
    pub kind: Option<SourceKind>,
    pub total: u64,
    pub progress: u64,
    pub current_key: String,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub kind_statuses: BTreeMap<SourceKind, KindStatus>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            running: false,
            kind: None,
            total: 0,
            progress: 0,
            current_key: String::new(),
            message: "idle".to_string(),
            started_at: None,
            last_update: None,
            kind_statuses: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProgressHub {
    state: Mutex<ProgressSnapshot>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking writer leaves the slot readable; the data is plain values.
    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Claim the slot for `kind`.
    ///
    /// Fails with the current snapshot when any run is in flight.
    pub fn try_begin(&self, kind: SourceKind) -> Result<ProgressSnapshot, ProgressSnapshot> {
        let mut state = self.lock();
        if state.running {
            return Err(state.clone());
        }
        let now = Utc::now();
        let message = format!("starting {kind}");
        state.running = true;
        state.kind = Some(kind);
        state.total = 0;
        state.progress = 0;
        state.current_key.clear();
        state.message = message.clone();
        state.started_at = Some(now);
        state.last_update = Some(now);
        state.kind_statuses.insert(
            kind,
            KindStatus {
                status: RunStatus::Running,
                message,
                updated_at: now,
            },
        );
        Ok(state.clone())
    }

    pub fn set_total(&self, total: u64) {
        let mut state = self.lock();
        state.total = total;
        state.progress = state.progress.min(total);
        state.last_update = Some(Utc::now());
    }

    /// Move the counter forward. Never moves backwards and never past `total`.
    pub fn advance(&self, to: u64, current_key: &str, message: impl Into<String>) {
        let mut state = self.lock();
        let clamped = to.min(state.total);
        state.progress = state.progress.max(clamped);
        state.current_key = current_key.to_string();
        state.message = message.into();
        state.last_update = Some(Utc::now());
    }

    pub fn set_message(&self, current_key: &str, message: impl Into<String>) {
        let mut state = self.lock();
        state.current_key = current_key.to_string();
        state.message = message.into();
        state.last_update = Some(Utc::now());
    }

    /// Release the slot with a terminal status for `kind`
    pub fn finish(&self, kind: SourceKind, status: RunStatus, message: impl Into<String>) {
        let message = message.into();
        let now = Utc::now();
        let mut state = self.lock();
        if status == RunStatus::Ok {
            state.progress = state.total;
        }
        state.running = false;
        state.message = message.clone();
        state.last_update = Some(now);
        state.kind_statuses.insert(
            kind,
            KindStatus {
                status,
                message,
                updated_at: now,
            },
        );
    }
}
