// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Desired state and finalizer bookkeeping derived from a ServiceAccount.

use crate::constants::{annotations, FINALIZER};
use crate::error::{PiaError, Result};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::ResourceExt;
use std::fmt;

/// `(namespace, name)` of a ServiceAccount.
///
/// This is both the reconcile key and the identity an association is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What the annotations ask for, re-derived on every reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub role_arn: String,
    pub assume_role_arn: Option<String>,
    pub tagging_enabled: bool,
}

fn validate_arn(annotation: &str, value: &str) -> Result<()> {
    if value.starts_with("arn:") {
        Ok(())
    } else {
        Err(PiaError::InvalidAnnotation(format!(
            "{} must be an IAM role ARN, got {:?}",
            annotation, value
        )))
    }
}

/// Operator view of a ServiceAccount
pub trait ServiceAccountExt {
    fn object_key(&self) -> ObjectKey;
    fn annotation(&self, key: &str) -> Option<&str>;
    /// Cached association id, ignoring an empty value
    fn association_id(&self) -> Option<&str>;
    fn has_finalizer(&self) -> bool;
    fn is_being_deleted(&self) -> bool;
    /// `Ok(None)` when the role annotation is absent
    fn desired_state(&self) -> Result<Option<DesiredState>>;
    /// Returns true if the finalizer was added
    fn add_finalizer(&mut self) -> bool;
    /// Returns true if the finalizer was removed
    fn remove_finalizer(&mut self) -> bool;
    fn set_association_id(&mut self, id: &str);
    fn strip_association_annotations(&mut self);
}

impl ServiceAccountExt for ServiceAccount {
    fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    fn association_id(&self) -> Option<&str> {
        self.annotation(annotations::ASSOCIATION_ID)
            .filter(|id| !id.is_empty())
    }

    fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn desired_state(&self) -> Result<Option<DesiredState>> {
        let Some(role_arn) = self.annotation(annotations::ROLE) else {
            return Ok(None);
        };

        let role_arn = role_arn.trim();
        if role_arn.is_empty() {
            return Err(PiaError::InvalidAnnotation(format!(
                "{} is set but empty",
                annotations::ROLE
            )));
        }
        validate_arn(annotations::ROLE, role_arn)?;

        let assume_role_arn = self
            .annotation(annotations::ASSUME_ROLE)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| validate_arn(annotations::ASSUME_ROLE, v).map(|_| v.to_string()))
            .transpose()?;

        let tagging_enabled = self.annotation(annotations::TAGGING) != Some("false");

        Ok(Some(DesiredState {
            role_arn: role_arn.to_string(),
            assume_role_arn,
            tagging_enabled,
        }))
    }

    fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.finalizers_mut().push(FINALIZER.to_string());
        true
    }

    fn remove_finalizer(&mut self) -> bool {
        let finalizers = self.finalizers_mut();
        let before = finalizers.len();
        finalizers.retain(|f| f != FINALIZER);
        finalizers.len() != before
    }

    fn set_association_id(&mut self, id: &str) {
        self.annotations_mut()
            .insert(annotations::ASSOCIATION_ID.to_string(), id.to_string());
    }

    fn strip_association_annotations(&mut self) {
        if let Some(a) = self.metadata.annotations.as_mut() {
            for key in annotations::RELEASED_ON_CLEANUP {
                a.remove(key);
            }
        }
    }
}
