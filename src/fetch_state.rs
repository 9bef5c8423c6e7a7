//! Per-item fetch status used by the statics synchronizer.
//!
//! A resolved item has no record at all; a record only exists while an item
//! is wanted but not yet in the content cache.

use serde::{Deserialize, Serialize};

use crate::config::FetchConfig;
use crate::model::ItemType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Idle,
    Loading,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorReason {
    Network,
    Unauthorized,
    NotFound,
    Unknown,
    /// Persisting the fetched entity locally failed.
    Client,
}

impl FetchErrorReason {
    /// Delay before the scheduler should try the item again.
    pub fn retry_delay_ms(self, config: &FetchConfig) -> i64 {
        let secs = match self {
            FetchErrorReason::Network => config.network_retry_secs,
            FetchErrorReason::Unauthorized => config.unauthorized_retry_secs,
            FetchErrorReason::NotFound => config.not_found_retry_secs,
            FetchErrorReason::Unknown => config.unknown_retry_secs,
            FetchErrorReason::Client => config.client_retry_secs,
        };
        (secs as i64).saturating_mul(1000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchState {
    pub item_id: String,
    pub item_type: ItemType,
    pub status: FetchStatus,
    #[serde(default)]
    pub error_reason: Option<FetchErrorReason>,
    pub last_attempt_ms: i64,
    pub try_next_ms: i64,
}

impl FetchState {
    /// A freshly requested item, ready immediately.
    pub fn requested(item_type: ItemType, item_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            item_id: item_id.into(),
            item_type,
            status: FetchStatus::Idle,
            error_reason: None,
            last_attempt_ms: now_ms,
            try_next_ms: now_ms,
        }
    }

    pub fn key(&self) -> String {
        state_key(self.item_type, &self.item_id)
    }

    pub fn is_ready(&self, now_ms: i64) -> bool {
        self.status == FetchStatus::Idle && self.try_next_ms <= now_ms
    }

    pub fn loading(mut self, now_ms: i64) -> Self {
        self.status = FetchStatus::Loading;
        self.error_reason = None;
        self.last_attempt_ms = now_ms;
        self.try_next_ms = self.try_next_ms.max(now_ms);
        self
    }

    pub fn failed(mut self, reason: FetchErrorReason, now_ms: i64, config: &FetchConfig) -> Self {
        self.status = FetchStatus::Error;
        self.error_reason = Some(reason);
        self.last_attempt_ms = now_ms;
        self.try_next_ms = now_ms.saturating_add(reason.retry_delay_ms(config));
        self
    }

    /// Back to `Idle`, ready right away.
    pub fn rearmed(mut self, now_ms: i64) -> Self {
        self.status = FetchStatus::Idle;
        self.try_next_ms = now_ms.max(self.last_attempt_ms);
        self
    }
}

pub fn state_key(item_type: ItemType, item_id: &str) -> String {
    format!("{}:{}", item_type, item_id)
}

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
