// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Finds the association that belongs to a ServiceAccount.
//!
//! The cached association id is tried first. When it is missing, points at an
//! association that no longer exists, or points at one bound to a different
//! ServiceAccount, the full list of the cluster is scanned instead. A stale
//! cache therefore never leads to a duplicate association.

use crate::aws::{Association, AssociationClient};
use crate::error::{PiaError, Result};
use crate::types::ObjectKey;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct IdentityResolver {
    client: Arc<dyn AssociationClient>,
}

impl IdentityResolver {
    pub fn new(client: Arc<dyn AssociationClient>) -> Self {
        Self { client }
    }

    /// Resolve the association of `key`, or fail with
    /// [`PiaError::AssociationNotFound`] when there is none.
    pub async fn resolve(&self, key: &ObjectKey, cached_id: Option<&str>) -> Result<Association> {
        if let Some(id) = cached_id.filter(|id| !id.is_empty()) {
            match self.client.describe(id).await {
                Ok(association) if association.is_bound_to(&key.namespace, &key.name) => {
                    debug!(object = %key, association_id = id, "Resolved association from cache");
                    return Ok(association);
                }
                Ok(association) => {
                    warn!(
                        object = %key,
                        association_id = id,
                        "Cached association belongs to {}/{}, looking up by identity",
                        association.namespace,
                        association.service_account
                    );
                }
                Err(e) if e.is_remote_not_found() => {
                    info!(object = %key, association_id = id, "Cached association no longer exists, looking up by identity");
                }
                Err(e) => return Err(e),
            }
        }

        self.find_by_identity(key)
            .await?
            .ok_or_else(|| PiaError::AssociationNotFound {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            })
    }

    /// Scan every association of the cluster for one bound to `key`
    pub async fn find_by_identity(&self, key: &ObjectKey) -> Result<Option<Association>> {
        let found = self
            .client
            .list()
            .await?
            .into_iter()
            .find(|a| a.is_bound_to(&key.namespace, &key.name));

        match &found {
            Some(a) => debug!(object = %key, association_id = %a.id, "Found association by identity"),
            None => debug!(object = %key, "No association bound to ServiceAccount"),
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::client::MockAssociationClient;
    use crate::error::{AwsError, AwsErrorKind};

    fn key() -> ObjectKey {
        ObjectKey::new("default", "app")
    }

    fn association(id: &str, namespace: &str, name: &str) -> Association {
        Association::summary(id, "test-cluster", namespace, name)
    }

    fn aws_error(kind: AwsErrorKind) -> PiaError {
        PiaError::AwsError(AwsError::new("DescribePodIdentityAssociation", kind, "boom"))
    }

    #[tokio::test]
    async fn test_resolve_uses_cached_id() {
        let mut client = MockAssociationClient::new();
        client
            .expect_describe()
            .withf(|id| id == "a-1")
            .times(1)
            .returning(|_| Ok(association("a-1", "default", "app")));
        client.expect_list().never();

        let resolver = IdentityResolver::new(Arc::new(client));
        let found = resolver.resolve(&key(), Some("a-1")).await.unwrap();

        assert_eq!(found.id, "a-1");
    }

    #[tokio::test]
    async fn test_resolve_without_cache_scans() {
        let mut client = MockAssociationClient::new();
        client.expect_describe().never();
        client.expect_list().times(1).returning(|| {
            Ok(vec![
                association("a-9", "other", "app"),
                association("a-2", "default", "app"),
            ])
        });

        let resolver = IdentityResolver::new(Arc::new(client));
        let found = resolver.resolve(&key(), None).await.unwrap();

        assert_eq!(found.id, "a-2");
    }

    #[tokio::test]
    async fn test_resolve_empty_cache_is_ignored() {
        let mut client = MockAssociationClient::new();
        client.expect_describe().never();
        client
            .expect_list()
            .times(1)
            .returning(|| Ok(vec![association("a-2", "default", "app")]));

        let resolver = IdentityResolver::new(Arc::new(client));
        let found = resolver.resolve(&key(), Some("")).await.unwrap();

        assert_eq!(found.id, "a-2");
    }

    #[tokio::test]
    async fn test_resolve_stale_cache_falls_back() {
        let mut client = MockAssociationClient::new();
        client
            .expect_describe()
            .times(1)
            .returning(|_| Err(aws_error(AwsErrorKind::NotFound)));
        client
            .expect_list()
            .times(1)
            .returning(|| Ok(vec![association("a-2", "default", "app")]));

        let resolver = IdentityResolver::new(Arc::new(client));
        let found = resolver.resolve(&key(), Some("a-1")).await.unwrap();

        assert_eq!(found.id, "a-2");
    }

    #[tokio::test]
    async fn test_resolve_cache_bound_elsewhere_falls_back() {
        let mut client = MockAssociationClient::new();
        client
            .expect_describe()
            .times(1)
            .returning(|_| Ok(association("a-1", "default", "someone-else")));
        client.expect_list().times(1).returning(|| Ok(vec![]));

        let resolver = IdentityResolver::new(Arc::new(client));
        let err = resolver.resolve(&key(), Some("a-1")).await.unwrap_err();

        assert!(matches!(err, PiaError::AssociationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolve_propagates_other_describe_errors() {
        let mut client = MockAssociationClient::new();
        client
            .expect_describe()
            .times(1)
            .returning(|_| Err(aws_error(AwsErrorKind::Throttled)));
        client.expect_list().never();

        let resolver = IdentityResolver::new(Arc::new(client));
        let err = resolver.resolve(&key(), Some("a-1")).await.unwrap_err();

        assert!(!err.is_remote_not_found());
        assert!(matches!(
            err,
            PiaError::AwsError(AwsError {
                kind: AwsErrorKind::Throttled,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_find_by_identity_none() {
        let mut client = MockAssociationClient::new();
        client
            .expect_list()
            .times(1)
            .returning(|| Ok(vec![association("a-3", "default", "other")]));

        let resolver = IdentityResolver::new(Arc::new(client));
        assert!(resolver.find_by_identity(&key()).await.unwrap().is_none());
    }
}
