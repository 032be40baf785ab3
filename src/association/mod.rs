// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pod Identity Association resolution and lifecycle.

pub mod lifecycle;
pub mod resolver;

pub use lifecycle::AssociationLifecycle;
pub use resolver::IdentityResolver;
