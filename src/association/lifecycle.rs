// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Translates desired state into association create/update/delete calls.

use crate::association::resolver::IdentityResolver;
use crate::aws::{Association, AssociationClient, CreateAssociationRequest, UpdateAssociationRequest};
use crate::constants::{tags, OPERATOR_NAME};
use crate::error::{PiaError, Result};
use crate::types::{DesiredState, ObjectKey};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Descriptive tags for the association of `key`
pub fn build_tags(key: &ObjectKey, desired: &DesiredState) -> HashMap<String, String> {
    let mut tag_set = HashMap::from([
        (tags::MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
        (tags::SERVICE_ACCOUNT.to_string(), key.name.clone()),
        (tags::NAMESPACE.to_string(), key.namespace.clone()),
        (tags::BASE_ROLE.to_string(), desired.role_arn.clone()),
    ]);
    if let Some(assume_role) = &desired.assume_role_arn {
        tag_set.insert(tags::ASSUME_ROLE.to_string(), assume_role.clone());
    }
    tag_set
}

fn tags_for(key: &ObjectKey, desired: &DesiredState) -> Option<HashMap<String, String>> {
    desired.tagging_enabled.then(|| build_tags(key, desired))
}

pub fn build_create_request(key: &ObjectKey, desired: &DesiredState) -> CreateAssociationRequest {
    CreateAssociationRequest {
        namespace: key.namespace.clone(),
        service_account: key.name.clone(),
        role_arn: desired.role_arn.clone(),
        target_role_arn: desired.assume_role_arn.clone(),
        tags: tags_for(key, desired),
    }
}

pub fn build_update_request(
    key: &ObjectKey,
    desired: &DesiredState,
    association_id: &str,
) -> UpdateAssociationRequest {
    let tag_set = tags_for(key, desired);
    let untag_keys = tags::MANAGED
        .iter()
        .filter(|k| match &tag_set {
            Some(t) => !t.contains_key(**k),
            None => true,
        })
        .map(|k| k.to_string())
        .collect();

    UpdateAssociationRequest {
        association_id: association_id.to_string(),
        role_arn: desired.role_arn.clone(),
        target_role_arn: desired.assume_role_arn.clone(),
        tags: tag_set,
        untag_keys,
    }
}

/// Association operations on behalf of a ServiceAccount
#[derive(Clone)]
pub struct AssociationLifecycle {
    client: Arc<dyn AssociationClient>,
    resolver: IdentityResolver,
}

impl AssociationLifecycle {
    pub fn new(client: Arc<dyn AssociationClient>) -> Self {
        Self {
            resolver: IdentityResolver::new(client.clone()),
            client,
        }
    }

    pub async fn resolve(&self, key: &ObjectKey, cached_id: Option<&str>) -> Result<Association> {
        self.resolver.resolve(key, cached_id).await
    }

    #[instrument(skip(self, desired), fields(object = %key))]
    pub async fn create(&self, key: &ObjectKey, desired: &DesiredState) -> Result<Association> {
        let association = self
            .client
            .create(&build_create_request(key, desired))
            .await?;
        info!(association_id = %association.id, "Association created");
        Ok(association)
    }

    /// Update the association `association_id`, or the one found by identity
    /// when no id is known
    #[instrument(skip(self, desired), fields(object = %key))]
    pub async fn update(
        &self,
        key: &ObjectKey,
        desired: &DesiredState,
        association_id: Option<&str>,
    ) -> Result<Association> {
        let association_id = match association_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                self.resolver
                    .find_by_identity(key)
                    .await?
                    .ok_or_else(|| PiaError::AssociationNotFound {
                        namespace: key.namespace.clone(),
                        name: key.name.clone(),
                    })?
                    .id
            }
        };

        let mut association = self
            .client
            .update(&build_update_request(key, desired, &association_id))
            .await?;
        if association.id.is_empty() {
            association.id = association_id;
        }
        info!(association_id = %association.id, "Association updated");
        Ok(association)
    }

    /// Delete whatever association `key` owns. Succeeds when there is none.
    #[instrument(skip(self), fields(object = %key))]
    pub async fn delete(&self, key: &ObjectKey, cached_id: Option<&str>) -> Result<()> {
        let association = match self.resolver.resolve(key, cached_id).await {
            Ok(association) => association,
            Err(PiaError::AssociationNotFound { .. }) => {
                info!("No association to delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match self.client.delete(&association.id).await {
            Ok(()) => {
                info!(association_id = %association.id, "Association deleted");
                Ok(())
            }
            Err(e) if e.is_remote_not_found() => {
                info!(association_id = %association.id, "Association already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
