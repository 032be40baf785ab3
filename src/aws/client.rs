// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pod Identity Association operations consumed by the reconciler

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

#[cfg(test)]
use mockall::automock;

/// Lifecycle state of an association as reported by EKS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationStatus {
    Creating,
    Active,
    Deleting,
    Failed,
}

impl fmt::Display for AssociationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Deleting => "DELETING",
            Self::Failed => "FAILED",
        })
    }
}

/// An EKS Pod Identity Association.
///
/// Entries returned by [`AssociationClient::list`] are summaries: only the
/// identity fields (`id`, `arn`, `cluster_name`, `namespace`,
/// `service_account`) are filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub id: String,
    pub arn: Option<String>,
    pub cluster_name: String,
    pub namespace: String,
    pub service_account: String,
    pub role_arn: Option<String>,
    pub target_role_arn: Option<String>,
    pub tags: HashMap<String, String>,
    pub status: AssociationStatus,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
}

impl Association {
    /// Minimal association carrying just its identity
    pub fn summary(
        id: impl Into<String>,
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
        service_account: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            arn: None,
            cluster_name: cluster_name.into(),
            namespace: namespace.into(),
            service_account: service_account.into(),
            role_arn: None,
            target_role_arn: None,
            tags: HashMap::new(),
            status: AssociationStatus::Active,
            created_at: None,
            modified_at: None,
        }
    }

    /// True if this association binds the given ServiceAccount
    pub fn is_bound_to(&self, namespace: &str, service_account: &str) -> bool {
        self.namespace == namespace && self.service_account == service_account
    }
}

/// Payload of a create call. The cluster comes from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAssociationRequest {
    pub namespace: String,
    pub service_account: String,
    pub role_arn: String,
    pub target_role_arn: Option<String>,
    /// Descriptive tags, `None` when tagging is disabled
    pub tags: Option<HashMap<String, String>>,
}

/// Payload of an update call against an existing association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateAssociationRequest {
    pub association_id: String,
    pub role_arn: String,
    pub target_role_arn: Option<String>,
    /// Descriptive tags, `None` when tagging is disabled
    pub tags: Option<HashMap<String, String>>,
    /// Operator-owned tag keys to remove from the association
    pub untag_keys: Vec<String>,
}

/// Remote API for Pod Identity Associations of one EKS cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AssociationClient: Send + Sync {
    async fn create(&self, request: &CreateAssociationRequest) -> Result<Association>;

    async fn update(&self, request: &UpdateAssociationRequest) -> Result<Association>;

    async fn delete(&self, association_id: &str) -> Result<()>;

    async fn describe(&self, association_id: &str) -> Result<Association>;

    /// All associations of the cluster
    async fn list(&self) -> Result<Vec<Association>>;
}
