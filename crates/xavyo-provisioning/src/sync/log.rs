//! Synchronization run logs.
//!
//! One [`SyncLog`] per run, one [`SyncActionLog`] per (action, outcome) pair
//! with a running count, and one [`SyncItemLog`] per processed item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{SyncActionLogId, SyncActionType, SyncConfigId, SyncItemLogId, SyncLogId};

/// Outcome of one processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemOutcome {
    Success,
    Warning,
    Error,
}

impl ItemOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Success => "SUCCESS",
            ItemOutcome::Warning => "WARNING",
            ItemOutcome::Error => "ERROR",
        }
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log of one synchronization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: SyncLogId,
    pub config_id: SyncConfigId,
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub contains_error: bool,
    pub cancelled: bool,
    /// Last token seen by the run.
    pub token: Option<String>,
    /// Fatal error that ended the run.
    pub error: Option<String>,
}

impl SyncLog {
    #[must_use]
    pub fn start(config_id: SyncConfigId) -> Self {
        Self {
            id: SyncLogId::new(),
            config_id,
            running: true,
            started_at: Utc::now(),
            ended_at: None,
            contains_error: false,
            cancelled: false,
            token: None,
            error: None,
        }
    }

    pub fn finish(&mut self) {
        self.running = false;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.contains_error = true;
        self.finish();
    }
}

/// Count of items that took one action with one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncActionLog {
    pub id: SyncActionLogId,
    pub log_id: SyncLogId,
    pub action: SyncActionType,
    pub outcome: ItemOutcome,
    pub count: u64,
}

impl SyncActionLog {
    #[must_use]
    pub fn new(log_id: SyncLogId, action: SyncActionType, outcome: ItemOutcome) -> Self {
        Self {
            id: SyncActionLogId::new(),
            log_id,
            action,
            outcome,
            count: 0,
        }
    }
}

/// Record of one processed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemLog {
    pub id: SyncItemLogId,
    pub action_log_id: SyncActionLogId,
    pub uid: String,
    pub display_name: Option<String>,
    pub outcome: ItemOutcome,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncItemLog {
    pub fn new(
        action_log_id: SyncActionLogId,
        uid: impl Into<String>,
        outcome: ItemOutcome,
        message: Option<String>,
    ) -> Self {
        Self {
            id: SyncItemLogId::new(),
            action_log_id,
            uid: uid.into(),
            display_name: None,
            outcome,
            message,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }
}
