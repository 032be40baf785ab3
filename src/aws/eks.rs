// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! [`AssociationClient`] backed by the AWS EKS SDK

use crate::aws::client::{
    Association, AssociationClient, AssociationStatus, CreateAssociationRequest,
    UpdateAssociationRequest,
};
use crate::error::{AwsError, AwsErrorKind, PiaError, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_eks::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_eks::types::{PodIdentityAssociation, PodIdentityAssociationSummary};
use aws_sdk_eks::Client as EksClient;
use std::fmt::Debug;
use tracing::{debug, info, instrument};

/// Pod Identity Associations of a single EKS cluster
pub struct EksAssociationClient {
    client: EksClient,
    cluster_name: String,
}

impl Debug for EksAssociationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EksAssociationClient")
            .field("cluster_name", &self.cluster_name)
            .finish_non_exhaustive()
    }
}

impl EksAssociationClient {
    pub fn new(sdk_config: &SdkConfig, cluster_name: impl Into<String>) -> Self {
        Self {
            client: EksClient::new(sdk_config),
            cluster_name: cluster_name.into(),
        }
    }

    /// Build a client from the default credential chain (IRSA, Pod Identity, env, profile)
    pub async fn from_region(region: &str, cluster_name: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self::new(&sdk_config, cluster_name)
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
}

fn convert_association(cluster_name: &str, assoc: &PodIdentityAssociation) -> Association {
    Association {
        id: assoc.association_id().unwrap_or_default().to_string(),
        arn: assoc.association_arn().map(str::to_string),
        cluster_name: assoc.cluster_name().unwrap_or(cluster_name).to_string(),
        namespace: assoc.namespace().unwrap_or_default().to_string(),
        service_account: assoc.service_account().unwrap_or_default().to_string(),
        role_arn: assoc.role_arn().map(str::to_string),
        target_role_arn: assoc.target_role_arn().map(str::to_string),
        tags: assoc.tags().cloned().unwrap_or_default(),
        // EKS does not report a status; a described association is live
        status: AssociationStatus::Active,
        created_at: assoc.created_at().map(|t| t.to_string()),
        modified_at: assoc.modified_at().map(|t| t.to_string()),
    }
}

fn convert_summary(cluster_name: &str, assoc: &PodIdentityAssociationSummary) -> Association {
    let mut association = Association::summary(
        assoc.association_id().unwrap_or_default(),
        assoc.cluster_name().unwrap_or(cluster_name),
        assoc.namespace().unwrap_or_default(),
        assoc.service_account().unwrap_or_default(),
    );
    association.arn = assoc.association_arn().map(str::to_string);
    association
}

fn require_association(
    cluster_name: &str,
    operation: &'static str,
    assoc: Option<&PodIdentityAssociation>,
) -> Result<Association> {
    assoc
        .map(|a| convert_association(cluster_name, a))
        .ok_or_else(|| {
            PiaError::AwsError(AwsError::new(
                operation,
                AwsErrorKind::Other,
                "response did not contain an association",
            ))
        })
}

/// Reduce an SDK failure to an [`AwsError`] the retry policy understands
fn map_sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> PiaError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    let kind = match &err {
        SdkError::TimeoutError(_) => AwsErrorKind::Timeout,
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => AwsErrorKind::Unavailable,
        SdkError::ServiceError(service) => AwsErrorKind::from_code(service.err().code()),
        _ => AwsErrorKind::Other,
    };

    PiaError::AwsError(AwsError::new(
        operation,
        kind,
        DisplayErrorContext(&err).to_string(),
    ))
}

#[async_trait]
impl AssociationClient for EksAssociationClient {
    #[instrument(skip(self, request), fields(namespace = %request.namespace, name = %request.service_account))]
    async fn create(&self, request: &CreateAssociationRequest) -> Result<Association> {
        const OPERATION: &str = "CreatePodIdentityAssociation";

        info!(
            "Creating Pod Identity Association: roleArn={}, targetRoleArn={:?}, clusterName={}",
            request.role_arn, request.target_role_arn, self.cluster_name
        );

        let output = self
            .client
            .create_pod_identity_association()
            .cluster_name(&self.cluster_name)
            .namespace(&request.namespace)
            .service_account(&request.service_account)
            .role_arn(&request.role_arn)
            .set_target_role_arn(request.target_role_arn.clone())
            .set_tags(request.tags.clone())
            .send()
            .await
            .map_err(|e| map_sdk_error(OPERATION, e))?;

        let association =
            require_association(&self.cluster_name, OPERATION, output.association())?;
        info!("Created Pod Identity Association {}", association.id);
        Ok(association)
    }

    #[instrument(skip(self, request), fields(association_id = %request.association_id))]
    async fn update(&self, request: &UpdateAssociationRequest) -> Result<Association> {
        const OPERATION: &str = "UpdatePodIdentityAssociation";

        info!(
            "Updating Pod Identity Association: roleArn={}, targetRoleArn={:?}, clusterName={}",
            request.role_arn, request.target_role_arn, self.cluster_name
        );

        // An empty target role clears one that was set before
        let output = self
            .client
            .update_pod_identity_association()
            .cluster_name(&self.cluster_name)
            .association_id(&request.association_id)
            .role_arn(&request.role_arn)
            .target_role_arn(request.target_role_arn.clone().unwrap_or_default())
            .send()
            .await
            .map_err(|e| map_sdk_error(OPERATION, e))?;

        let mut association =
            require_association(&self.cluster_name, OPERATION, output.association())?;

        // Stale operator tags go first, then the current set is applied
        if let Some(arn) = association.arn.as_ref().filter(|_| !request.untag_keys.is_empty()) {
            self.client
                .untag_resource()
                .resource_arn(arn)
                .set_tag_keys(Some(request.untag_keys.clone()))
                .send()
                .await
                .map_err(|e| map_sdk_error("UntagResource", e))?;
            association.tags.retain(|k, _| !request.untag_keys.contains(k));
        }

        if let (Some(tags), Some(arn)) = (&request.tags, &association.arn) {
            self.client
                .tag_resource()
                .resource_arn(arn)
                .set_tags(Some(tags.clone()))
                .send()
                .await
                .map_err(|e| map_sdk_error("TagResource", e))?;
            association.tags.extend(tags.clone());
        }

        info!("Updated Pod Identity Association {}", association.id);
        Ok(association)
    }

    #[instrument(skip(self))]
    async fn delete(&self, association_id: &str) -> Result<()> {
        info!(
            "Deleting Pod Identity Association {} in cluster {}",
            association_id, self.cluster_name
        );

        self.client
            .delete_pod_identity_association()
            .cluster_name(&self.cluster_name)
            .association_id(association_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeletePodIdentityAssociation", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn describe(&self, association_id: &str) -> Result<Association> {
        const OPERATION: &str = "DescribePodIdentityAssociation";

        let output = self
            .client
            .describe_pod_identity_association()
            .cluster_name(&self.cluster_name)
            .association_id(association_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(OPERATION, e))?;

        require_association(&self.cluster_name, OPERATION, output.association())
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Association>> {
        let mut pages = self
            .client
            .list_pod_identity_associations()
            .cluster_name(&self.cluster_name)
            .into_paginator()
            .send();

        let mut associations = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| map_sdk_error("ListPodIdentityAssociations", e))?;
            associations.extend(page.associations().iter().map(|s| convert_summary(&self.cluster_name, s)));
        }

        debug!("Listed {} Pod Identity Associations", associations.len());
        Ok(associations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_eks::error::ErrorMetadata;
    use aws_sdk_eks::operation::describe_pod_identity_association::DescribePodIdentityAssociationError;
    use aws_sdk_eks::primitives::DateTime;
    use aws_sdk_eks::types::error::ResourceNotFoundException;
    use aws_smithy_runtime_api::client::result::ConnectorError;
    use std::collections::HashMap;

    type DescribeSdkError = SdkError<DescribePodIdentityAssociationError, ()>;

    fn mapped_kind(err: DescribeSdkError) -> AwsErrorKind {
        match map_sdk_error("DescribePodIdentityAssociation", err) {
            PiaError::AwsError(aws) => {
                assert_eq!(aws.operation, "DescribePodIdentityAssociation");
                aws.kind
            }
            other => panic!("expected an AWS error, got {other:?}"),
        }
    }

    #[test]
    fn test_sdk_timeout_maps_to_timeout() {
        let err = DescribeSdkError::timeout_error("operation timed out");
        assert_eq!(mapped_kind(err), AwsErrorKind::Timeout);
    }

    #[test]
    fn test_sdk_transport_failures_map_to_unavailable() {
        let dispatch = DescribeSdkError::dispatch_failure(ConnectorError::io(
            "connection refused".into(),
        ));
        assert_eq!(mapped_kind(dispatch), AwsErrorKind::Unavailable);

        let response = DescribeSdkError::response_error("truncated body", ());
        assert_eq!(mapped_kind(response), AwsErrorKind::Unavailable);
    }

    #[test]
    fn test_sdk_service_error_uses_error_code() {
        let not_found = ResourceNotFoundException::builder()
            .message("association not found")
            .meta(
                ErrorMetadata::builder()
                    .code("ResourceNotFoundException")
                    .build(),
            )
            .build();
        let err = DescribeSdkError::service_error(
            DescribePodIdentityAssociationError::ResourceNotFoundException(not_found),
            (),
        );
        let mapped = map_sdk_error("DescribePodIdentityAssociation", err);
        assert!(mapped.is_remote_not_found());
        assert_eq!(mapped.class(), crate::error::ErrorClass::Permanent);

        let throttled = DescribePodIdentityAssociationError::generic(
            ErrorMetadata::builder().code("ThrottlingException").build(),
        );
        assert_eq!(
            mapped_kind(DescribeSdkError::service_error(throttled, ())),
            AwsErrorKind::Throttled
        );
    }

    #[test]
    fn test_convert_association() {
        let assoc = PodIdentityAssociation::builder()
            .association_id("a-1")
            .association_arn("arn:aws:eks:eu-west-1:123456789012:podidentityassociation/test-cluster/a-1")
            .cluster_name("test-cluster")
            .namespace("default")
            .service_account("app")
            .role_arn("arn:aws:iam::123456789012:role/A")
            .target_role_arn("arn:aws:iam::123456789012:role/B")
            .tags("managed-by", "pia-operator")
            .created_at(DateTime::from_secs(0))
            .build();

        let converted = convert_association("test-cluster", &assoc);

        assert_eq!(converted.id, "a-1");
        assert!(converted.is_bound_to("default", "app"));
        assert_eq!(
            converted.role_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/A")
        );
        assert_eq!(
            converted.target_role_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/B")
        );
        assert_eq!(
            converted.tags,
            HashMap::from([("managed-by".to_string(), "pia-operator".to_string())])
        );
        assert_eq!(converted.status, AssociationStatus::Active);
        assert!(converted.created_at.is_some());
        assert!(converted.modified_at.is_none());
    }

    #[test]
    fn test_convert_summary_falls_back_to_client_cluster() {
        let summary = PodIdentityAssociationSummary::builder()
            .association_id("a-2")
            .namespace("kube-system")
            .service_account("dns")
            .build();

        let converted = convert_summary("test-cluster", &summary);

        assert_eq!(converted.id, "a-2");
        assert_eq!(converted.cluster_name, "test-cluster");
        assert!(converted.is_bound_to("kube-system", "dns"));
        assert!(converted.role_arn.is_none());
        assert!(converted.tags.is_empty());
    }

    #[test]
    fn test_require_association_missing() {
        let err = require_association("test-cluster", "DescribePodIdentityAssociation", None)
            .unwrap_err();
        assert!(matches!(
            err,
            PiaError::AwsError(AwsError {
                kind: AwsErrorKind::Other,
                ..
            })
        ));
    }
}
