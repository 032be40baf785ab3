// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to watch events.

pub mod predicate;
pub mod service_account;

pub use predicate::{should_reconcile, TriggerGate, TriggerSnapshot};
pub use service_account::{ReconcilePhase, ServiceAccountReconciler};
