//! Reveal Timeout Policy
//!
//! Deadlines are derived from stored timestamps only. Nothing here owns a
//! clock or a timer: callers pass the host's `now`.
//!
//! A game still waiting for its joiner has no deadline and never expires.
//! Only a committer who fails to reveal is penalized.

use serde::{Serialize, Deserialize};

use crate::core::clock::Timestamp;
use crate::error::InvalidInput;

/// Smallest accepted reveal window (seconds).
pub const DEFAULT_MIN_TIMEOUT_SECS: u64 = 60;

/// Largest accepted reveal window (seconds): 7 days.
pub const DEFAULT_MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Bounds on the reveal window chosen at game creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    /// Minimum timeout in seconds (inclusive, at least 1).
    pub min_secs: u64,
    /// Maximum timeout in seconds (inclusive).
    pub max_secs: u64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            min_secs: DEFAULT_MIN_TIMEOUT_SECS,
            max_secs: DEFAULT_MAX_TIMEOUT_SECS,
        }
    }
}

impl TimeoutPolicy {
    /// Create a policy with explicit bounds.
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Accept a timeout or reject it. Zero is always rejected.
    pub fn validate(&self, timeout_secs: u64) -> Result<u64, InvalidInput> {
        let min = self.min_secs.max(1);
        if timeout_secs < min || timeout_secs > self.max_secs {
            return Err(InvalidInput::TimeoutOutOfRange {
                got: timeout_secs,
                min,
                max: self.max_secs,
            });
        }
        Ok(timeout_secs)
    }
}

/// Reveal deadline for a game joined at `joined_at`.
pub fn deadline(joined_at: Timestamp, timeout_secs: u64) -> Result<Timestamp, InvalidInput> {
    joined_at
        .checked_add(timeout_secs)
        .ok_or(InvalidInput::DeadlineOverflow)
}

/// Has the reveal window closed?
#[inline]
pub fn is_expired(now: Timestamp, deadline: Timestamp) -> bool {
    now > deadline
}
