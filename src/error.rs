//! Crate-wide error kinds (spec §7, "ERROR HANDLING DESIGN").
//!
//! `CoachError` is used internally to distinguish the failure modes of the
//! remote client, the quota ledger and the shared storage layer. Per spec
//! §7's propagation policy, almost none of these ever reach the host: the
//! [`crate::coordinator::Coordinator`] boundary turns every variant except
//! `QuotaExceeded` into an empty result or a no-op.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoachError {
    /// Base URL or API key unset - remote disabled, offline fallback takes over.
    #[error("remote client not configured")]
    ConfigMissing,

    /// No network reachable.
    #[error("offline")]
    Offline,

    /// Request exceeded its deadline (5s per-request / 15s per-resource, spec §4.5).
    #[error("request timed out")]
    Timeout,

    /// 401/403 observed within the last 60s auth-backoff window.
    #[error("auth blocked until {0}")]
    AuthBlocked(DateTime<Utc>),

    /// Non-2xx HTTP status, no retry.
    #[error("http error {0}")]
    Http(u16),

    /// Response body didn't match any known shape.
    #[error("could not decode response")]
    Decode,

    /// Response arrived after a newer request had already been dispatched.
    #[error("stale response discarded")]
    Stale,

    /// Secure Fix daily quota already consumed.
    #[error("secure fix quota exceeded, {remaining} remaining, resets {reset_at}")]
    QuotaExceeded {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    /// Shared cross-process store could not be opened.
    #[error("shared storage unavailable")]
    StorageUnavailable,
}

impl CoachError {
    /// Whether this failure should count toward `consecutive_failures`
    /// (spec §4.8) and therefore may trigger the offline fallback path
    /// (spec §4.9: "last call returned Offline or Timeout").
    pub fn counts_as_remote_failure(&self) -> bool {
        matches!(self, CoachError::Offline | CoachError::Timeout)
    }
}
