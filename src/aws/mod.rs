// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod client;
pub mod eks;

pub use client::{
    Association, AssociationClient, AssociationStatus, CreateAssociationRequest,
    UpdateAssociationRequest,
};
pub use eks::EksAssociationClient;
