use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

/// Outcome of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    Succeeded,
    Skipped,
    Failed {
        reason: String,
        retryable: bool,
        retry_timeout: Duration,
    },
}

impl ProcessingResult {
    /// Permanent failure that needs operator intervention
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            retryable: false,
            retry_timeout: Duration::ZERO,
        }
    }

    /// Transient failure; a zero delay asks for an immediate retry
    pub fn retry(reason: impl Into<String>, retry_timeout: Duration) -> Self {
        Self::Failed {
            reason: reason.into(),
            retryable: true,
            retry_timeout,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Should be retried synchronously within the current pass
    pub fn retries_immediately(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                retryable: true,
                retry_timeout,
                ..
            } if retry_timeout.is_zero()
        )
    }

    /// When a failure may next be retried. Successes retry "now".
    pub fn retry_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Failed {
                retryable: true,
                retry_timeout,
                ..
            } => TimeDelta::from_std(*retry_timeout)
                .ok()
                .and_then(|delay| now.checked_add_signed(delay))
                .map(|time| time.min(retry_disabled()))
                .unwrap_or_else(retry_disabled),
            Self::Failed { .. } => retry_disabled(),
            _ => now,
        }
    }
}

/// Far-future retry time marking a failure that is never retried automatically.
///
/// Kept within four-digit years so it survives millisecond timestamp storage.
pub fn retry_disabled() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn is_retry_disabled(retry_time: DateTime<Utc>) -> bool {
    retry_time >= retry_disabled()
}
