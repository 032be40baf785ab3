// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ServiceAccount access through the Kubernetes API

use crate::constants::OPERATOR_NAME;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::{api::PostParams, Api, Client, ResourceExt};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

/// The ServiceAccount operations the reconciler needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceAccountClient: Send + Sync {
    /// Fetch a ServiceAccount, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceAccount>>;

    /// Replace a ServiceAccount.
    ///
    /// The object's resourceVersion is sent along, so a concurrent writer
    /// makes this fail with a 409 Conflict.
    async fn update(&self, service_account: &ServiceAccount) -> Result<ServiceAccount>;
}

/// [`ServiceAccountClient`] backed by a kube [`Client`]
#[derive(Clone)]
pub struct KubeServiceAccountClient {
    client: Client,
}

impl KubeServiceAccountClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceAccountClient for KubeServiceAccountClient {
    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceAccount>> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);

        match api.get(name).await {
            Ok(sa) => Ok(Some(sa)),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!("ServiceAccount {}/{} not found", namespace, name);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, service_account), fields(namespace = ?service_account.namespace(), name = %service_account.name_any()))]
    async fn update(&self, service_account: &ServiceAccount) -> Result<ServiceAccount> {
        let namespace = service_account.namespace().unwrap_or_default();
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &namespace);

        let params = PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        let updated = api
            .replace(&service_account.name_any(), &params, service_account)
            .await?;

        debug!(
            "Updated ServiceAccount {}/{} (resourceVersion {:?})",
            namespace,
            updated.name_any(),
            updated.resource_version()
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, PiaError};
    use crate::test_utils::{conflict_json, not_found_json, service_account_json, MockService};

    const SA_PATH: &str = "/api/v1/namespaces/default/serviceaccounts/app";

    #[tokio::test]
    async fn test_get_existing_service_account() {
        let client = MockService::new()
            .on_get(SA_PATH, 200, &service_account_json("default", "app", "1"))
            .client();

        let sa = KubeServiceAccountClient::new(client)
            .get("default", "app")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(sa.name_any(), "app");
        assert_eq!(sa.namespace().as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn test_get_missing_service_account() {
        let client = MockService::new()
            .on_get(SA_PATH, 404, &not_found_json("serviceaccounts", "app"))
            .client();

        let sa = KubeServiceAccountClient::new(client)
            .get("default", "app")
            .await
            .unwrap();

        assert!(sa.is_none());
    }

    #[tokio::test]
    async fn test_update_returns_new_version() {
        let api_server =
            MockService::new().on_put(SA_PATH, 200, &service_account_json("default", "app", "2"));

        let sa: ServiceAccount =
            serde_json::from_str(&service_account_json("default", "app", "1")).unwrap();
        let updated = KubeServiceAccountClient::new(api_server.client())
            .update(&sa)
            .await
            .unwrap();

        assert_eq!(updated.resource_version().as_deref(), Some("2"));
        let requests = api_server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with(&format!("PUT {}?", SA_PATH)));
        assert!(requests[0].contains(&format!("fieldManager={}", OPERATOR_NAME)));
    }

    #[tokio::test]
    async fn test_update_conflict_is_retryable() {
        let client = MockService::new()
            .on_put(SA_PATH, 409, &conflict_json("serviceaccounts", "app"))
            .client();

        let sa: ServiceAccount =
            serde_json::from_str(&service_account_json("default", "app", "1")).unwrap();
        let err = KubeServiceAccountClient::new(client)
            .update(&sa)
            .await
            .unwrap_err();

        assert!(matches!(err, PiaError::KubeError(_)));
        assert_eq!(err.class(), ErrorClass::Retryable);
    }
}
