// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Domain types derived from the watched ServiceAccounts.

pub mod service_account;

pub use service_account::{DesiredState, ObjectKey, ServiceAccountExt};
