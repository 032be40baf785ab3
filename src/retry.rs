// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Retry policy for failed reconciles.
//!
//! Failures are turned into a [`Verdict`] that tells the controller when to
//! come back. Transient failures back off exponentially per ServiceAccount;
//! the attempt counters are shared by every reconcile worker.

use crate::constants::{retry, ERROR_POLICY_REQUEUE_SECS};
use crate::error::{ErrorClass, PiaError};
use crate::types::ObjectKey;
use kube::runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

/// Exponential backoff bounded by a cap and a per-object attempt ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(retry::BASE_DELAY_SECS),
            Duration::from_secs(retry::MAX_DELAY_SECS),
            retry::MAX_ATTEMPTS,
        )
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay;
        for _ in 0..attempt {
            if delay >= self.max_delay {
                break;
            }
            delay = delay.saturating_mul(2);
        }
        delay.min(self.max_delay)
    }
}

/// What the controller should do after a reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing left to do until the object changes
    Done,
    /// Reconcile again right away
    RequeueNow,
    /// Reconcile again after the delay
    RequeueAfter(Duration),
}

impl Verdict {
    pub fn is_done(&self) -> bool {
        matches!(self, Verdict::Done)
    }
}

impl From<Verdict> for Action {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Done => Action::await_change(),
            Verdict::RequeueNow => Action::requeue(Duration::ZERO),
            Verdict::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

/// Outcome of a failure on the release path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionVerdict {
    /// Carry on and drop the finalizer despite the failure
    Proceed,
    /// Stop here and retry as instructed
    Retry(Verdict),
}

/// Per-object retry counters plus the policy that consumes them
#[derive(Debug, Default)]
pub struct RetryTracker {
    policy: RetryPolicy,
    counts: Mutex<HashMap<ObjectKey, u32>>,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<ObjectKey, u32>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self, key: &ObjectKey) -> u32 {
        self.counts().get(key).copied().unwrap_or(0)
    }

    pub fn reset(&self, key: &ObjectKey) {
        self.counts().remove(key);
    }

    /// Count a transient failure; returns the delay, or None once the ceiling is reached
    fn record_transient(&self, key: &ObjectKey) -> Option<(u32, Duration)> {
        let mut counts = self.counts();
        let count = counts.entry(key.clone()).or_insert(0);
        if *count >= self.policy.max_attempts {
            return None;
        }
        let attempt = *count;
        *count += 1;
        Some((attempt, self.policy.backoff(attempt)))
    }

    /// Decide how to follow up on a failed create/update path operation
    pub fn handle_error(&self, key: &ObjectKey, err: &PiaError, operation: &str) -> Verdict {
        let class = err.class();
        error!(object = %key, operation, %class, "Operation failed: {}", err);

        match class {
            ErrorClass::Permanent => {
                info!(object = %key, operation, "Permanent error, not retrying");
                Verdict::Done
            }
            ErrorClass::Transient => match self.record_transient(key) {
                Some((attempt, delay)) => {
                    info!(
                        object = %key,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        "Transient error, retrying in {:?}",
                        delay
                    );
                    Verdict::RequeueAfter(delay)
                }
                None => {
                    warn!(
                        object = %key,
                        operation,
                        max_attempts = self.policy.max_attempts,
                        "Max retry attempts reached, retrying in {:?}",
                        self.policy.max_delay
                    );
                    Verdict::RequeueAfter(self.policy.max_delay)
                }
            },
            ErrorClass::Retryable => {
                info!(object = %key, operation, "Retryable error, retrying immediately");
                Verdict::RequeueNow
            }
        }
    }

    /// Like [`handle_error`](Self::handle_error), but never wedges deletion:
    /// permanent failures and exhausted transient ones let the release continue.
    pub fn handle_deletion_error(
        &self,
        key: &ObjectKey,
        err: &PiaError,
        operation: &str,
    ) -> DeletionVerdict {
        let class = err.class();
        error!(object = %key, operation, %class, "Deletion operation failed: {}", err);

        match class {
            ErrorClass::Permanent => {
                warn!(object = %key, operation, "Permanent error during deletion, continuing anyway");
                DeletionVerdict::Proceed
            }
            ErrorClass::Transient => match self.record_transient(key) {
                Some((attempt, delay)) => {
                    info!(
                        object = %key,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        "Transient error during deletion, retrying in {:?}",
                        delay
                    );
                    DeletionVerdict::Retry(Verdict::RequeueAfter(delay))
                }
                None => {
                    warn!(
                        object = %key,
                        operation,
                        max_attempts = self.policy.max_attempts,
                        "Max retry attempts reached for deletion, continuing anyway"
                    );
                    DeletionVerdict::Proceed
                }
            },
            ErrorClass::Retryable => {
                info!(object = %key, operation, "Retryable error during deletion, retrying immediately");
                DeletionVerdict::Retry(Verdict::RequeueNow)
            }
        }
    }
}

/// Requeue delay for reconciles that return an error instead of a verdict
pub fn error_policy_delay() -> Duration {
    Duration::from_secs(ERROR_POLICY_REQUEUE_SECS)
}
