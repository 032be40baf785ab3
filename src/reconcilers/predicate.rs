// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Trigger filtering: only annotation changes that matter reach the reconciler.

use crate::constants::annotations;
use crate::retry::Verdict;
use crate::types::{ObjectKey, ServiceAccountExt};
use k8s_openapi::api::core::v1::ServiceAccount;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The parts of a ServiceAccount that decide whether a reconcile is needed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSnapshot {
    pub role: Option<String>,
    pub assume_role: Option<String>,
    pub tagging: Option<String>,
    pub has_finalizer: bool,
    pub deleting: bool,
}

impl TriggerSnapshot {
    pub fn of(sa: &ServiceAccount) -> Self {
        Self {
            role: sa.annotation(annotations::ROLE).map(str::to_string),
            assume_role: sa.annotation(annotations::ASSUME_ROLE).map(str::to_string),
            tagging: sa.annotation(annotations::TAGGING).map(str::to_string),
            has_finalizer: sa.has_finalizer(),
            deleting: sa.is_being_deleted(),
        }
    }

    /// Nothing for the operator to create or clean up
    fn is_inert(&self) -> bool {
        self.role.is_none() && self.assume_role.is_none() && !self.has_finalizer
    }
}

/// Decide whether the transition `old -> new` needs a reconcile.
///
/// A first sighting is reconciled when the object asks for an association or
/// still carries our finalizer. Afterwards only changes to the operator
/// annotations, or the start of deletion, count. Writes made by the reconciler
/// itself (finalizer, cached association id) do not.
pub fn should_reconcile(old: Option<&TriggerSnapshot>, new: &TriggerSnapshot) -> bool {
    match old {
        None => new.role.is_some() || new.assume_role.is_some() || new.has_finalizer,
        Some(old) => {
            old.role != new.role
                || old.assume_role != new.assume_role
                || old.tagging != new.tagging
                || (new.deleting && !old.deleting)
        }
    }
}

#[derive(Debug)]
struct GateEntry {
    snapshot: TriggerSnapshot,
    retry_pending: bool,
}

/// Applies [`should_reconcile`] to the controller's triggers.
///
/// Remembers the last snapshot per object. Objects with a pending requeue are
/// always let through so scheduled retries are not swallowed. Objects the
/// operator has no stake in are not remembered.
#[derive(Debug, Default)]
pub struct TriggerGate {
    seen: Mutex<HashMap<ObjectKey, GateEntry>>,
}

impl TriggerGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn seen(&self) -> MutexGuard<'_, HashMap<ObjectKey, GateEntry>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `snapshot` for `key` and report whether it should be reconciled
    pub fn admit(&self, key: &ObjectKey, snapshot: TriggerSnapshot) -> bool {
        let mut seen = self.seen();
        let previous = seen.get(key);
        let retry_pending = previous.is_some_and(|e| e.retry_pending);
        let admitted =
            retry_pending || should_reconcile(previous.map(|e| &e.snapshot), &snapshot);

        if !admitted && snapshot.is_inert() {
            seen.remove(key);
            return false;
        }
        seen.insert(
            key.clone(),
            GateEntry {
                snapshot,
                retry_pending,
            },
        );
        admitted
    }

    /// Record the outcome of a reconcile of `key`
    pub fn settle(&self, key: &ObjectKey, verdict: Verdict) {
        let mut seen = self.seen();
        let forget = match seen.get_mut(key) {
            Some(entry) => {
                entry.retry_pending = !verdict.is_done();
                verdict.is_done() && (entry.snapshot.deleting || entry.snapshot.is_inert())
            }
            None => false,
        };
        if forget {
            seen.remove(key);
        }
    }

    /// Drop whatever is remembered about `key`
    pub fn forget(&self, key: &ObjectKey) {
        self.seen().remove(key);
    }

    #[cfg(test)]
    pub(crate) fn is_tracked(&self, key: &ObjectKey) -> bool {
        self.seen().contains_key(key)
    }
}
