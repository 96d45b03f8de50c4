//! Account lockout policy.
//!
//! Per-account state machine: each failed login increments a counter;
//! reaching the threshold locks the account. A locked account rejects
//! logins until a successful password reset clears both the lock and the
//! counter. The decision logic is pure so the transitions are directly
//! testable; the atomic counter update itself lives in storage.

pub const DEFAULT_LOCKOUT_THRESHOLD: i32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure recorded; account still unlocked.
    Counted(i32),
    /// This failure crossed the threshold and locked the account. The
    /// lockout notification is sent exactly once, on this transition.
    Locked,
}

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    threshold: i32,
    enabled: bool,
}

impl LockoutPolicy {
    #[must_use]
    pub const fn new(threshold: i32, enabled: bool) -> Self {
        Self { threshold, enabled }
    }

    #[must_use]
    pub const fn threshold(&self) -> i32 {
        self.threshold
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Classify a failed login given the counter value *after* the atomic
    /// increment.
    #[must_use]
    pub const fn classify_failure(&self, attempts_after: i32) -> FailureOutcome {
        if self.enabled && attempts_after >= self.threshold {
            FailureOutcome::Locked
        } else {
            FailureOutcome::Counted(attempts_after)
        }
    }

    /// Whether the crossing failure should trigger a lockout notification.
    /// Only the exact transition emits a notification; further failures
    /// against an already-locked account (which are rejected earlier) or
    /// overshoot from concurrent increments do not.
    #[must_use]
    pub const fn should_notify(&self, attempts_after: i32) -> bool {
        self.enabled && attempts_after == self.threshold
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LOCKOUT_THRESHOLD, true)
    }
}
