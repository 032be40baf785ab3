// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ServiceAccount reconciler - keeps one Pod Identity Association per annotated ServiceAccount.

use crate::association::AssociationLifecycle;
use crate::aws::AssociationClient;
use crate::constants::annotations;
use crate::error::{PiaError, Result};
use crate::kubernetes::ServiceAccountClient;
use crate::reconcilers::predicate::{TriggerGate, TriggerSnapshot};
use crate::retry::{error_policy_delay, DeletionVerdict, RetryPolicy, RetryTracker, Verdict};
use crate::types::{ObjectKey, ServiceAccountExt};
use futures::StreamExt;
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::{
    runtime::{controller::Action, Controller},
    Api, Client,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Where a ServiceAccount stands relative to its association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// No role requested and nothing left to release
    NoDesiredAssociation,
    /// Role requested, no association known yet
    CreatePending,
    /// Role requested and an association id is cached
    UpdatePending,
    /// The association must be released, by deletion or withdrawn intent
    Deleting,
}

impl ReconcilePhase {
    pub fn of(sa: &ServiceAccount) -> Self {
        if sa.is_being_deleted() || sa.annotation(annotations::ROLE).is_none() {
            return if sa.has_finalizer() {
                Self::Deleting
            } else {
                Self::NoDesiredAssociation
            };
        }

        if sa.association_id().is_some() {
            Self::UpdatePending
        } else {
            Self::CreatePending
        }
    }
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoDesiredAssociation => "NoDesiredAssociation",
            Self::CreatePending => "CreatePending",
            Self::UpdatePending => "UpdatePending",
            Self::Deleting => "Deleting",
        })
    }
}

pub struct ServiceAccountReconciler {
    service_accounts: Arc<dyn ServiceAccountClient>,
    lifecycle: AssociationLifecycle,
    retry: RetryTracker,
    gate: TriggerGate,
}

impl ServiceAccountReconciler {
    pub fn new(
        service_accounts: Arc<dyn ServiceAccountClient>,
        associations: Arc<dyn AssociationClient>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service_accounts,
            lifecycle: AssociationLifecycle::new(associations),
            retry: RetryTracker::new(policy),
            gate: TriggerGate::new(),
        }
    }

    pub fn retry(&self) -> &RetryTracker {
        &self.retry
    }

    pub async fn run(self, client: Client) -> anyhow::Result<()> {
        let service_accounts: Api<ServiceAccount> = Api::all(client);
        let context = Arc::new(self);

        Controller::new(service_accounts, WatcherConfig::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled ServiceAccount: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Run one reconcile cycle for `key`.
    ///
    /// Never fails: every error is turned into a [`Verdict`].
    #[instrument(skip(self), fields(object = %key))]
    pub async fn reconcile_key(&self, key: &ObjectKey) -> Verdict {
        let sa = match self.service_accounts.get(&key.namespace, &key.name).await {
            Ok(Some(sa)) => sa,
            Ok(None) => {
                debug!("ServiceAccount is gone, nothing to do");
                self.retry.reset(key);
                self.gate.forget(key);
                return Verdict::Done;
            }
            Err(e) => return self.retry.handle_error(key, &e, "GetServiceAccount"),
        };

        let phase = ReconcilePhase::of(&sa);
        debug!(%phase, "Reconciling ServiceAccount");

        match phase {
            ReconcilePhase::NoDesiredAssociation => {
                self.retry.reset(key);
                Verdict::Done
            }
            ReconcilePhase::Deleting => self.release(key, sa).await,
            ReconcilePhase::CreatePending | ReconcilePhase::UpdatePending => {
                self.apply(key, sa).await
            }
        }
    }

    /// Create or update the association and cache its id
    async fn apply(&self, key: &ObjectKey, mut sa: ServiceAccount) -> Verdict {
        let desired = match sa.desired_state() {
            Ok(Some(desired)) => desired,
            Ok(None) => return Verdict::Done,
            Err(e) => return self.retry.handle_error(key, &e, "ReadAnnotations"),
        };

        // The finalizer has to be stored before an association can exist
        if sa.add_finalizer() {
            match self.service_accounts.update(&sa).await {
                Ok(updated) => {
                    info!("Added finalizer");
                    sa = updated;
                }
                Err(e) => return self.retry.handle_error(key, &e, "AddFinalizer"),
            }
        }

        let existing = match self.lifecycle.resolve(key, sa.association_id()).await {
            Ok(association) => Some(association),
            Err(PiaError::AssociationNotFound { .. }) => None,
            Err(e) => return self.retry.handle_error(key, &e, "ResolveAssociation"),
        };

        let association_id = match existing {
            Some(association) => {
                if let Err(e) = self
                    .lifecycle
                    .update(key, &desired, Some(&association.id))
                    .await
                {
                    return self.retry.handle_error(key, &e, "UpdateAssociation");
                }
                association.id
            }
            None => match self.lifecycle.create(key, &desired).await {
                Ok(association) => association.id,
                Err(e) => return self.retry.handle_error(key, &e, "CreateAssociation"),
            },
        };

        if sa.association_id() != Some(association_id.as_str()) {
            sa.set_association_id(&association_id);
            if let Err(e) = self.service_accounts.update(&sa).await {
                return self.retry.handle_error(key, &e, "StoreAssociationId");
            }
            debug!(association_id = %association_id, "Cached association id");
        }

        self.retry.reset(key);
        Verdict::Done
    }

    /// Delete the association, then drop the operator annotations and the finalizer
    async fn release(&self, key: &ObjectKey, mut sa: ServiceAccount) -> Verdict {
        if let Err(e) = self.lifecycle.delete(key, sa.association_id()).await {
            if let DeletionVerdict::Retry(verdict) =
                self.retry.handle_deletion_error(key, &e, "DeleteAssociation")
            {
                return verdict;
            }
        }

        sa.strip_association_annotations();
        sa.remove_finalizer();

        match self.service_accounts.update(&sa).await {
            Ok(_) => {
                info!("Released association and removed finalizer");
                self.retry.reset(key);
                Verdict::Done
            }
            Err(e) => match self.retry.handle_deletion_error(key, &e, "RemoveFinalizer") {
                DeletionVerdict::Retry(verdict) => verdict,
                DeletionVerdict::Proceed => {
                    warn!("Could not remove finalizer, giving up on this ServiceAccount");
                    self.retry.reset(key);
                    Verdict::Done
                }
            },
        }
    }
}

async fn reconcile(sa: Arc<ServiceAccount>, ctx: Arc<ServiceAccountReconciler>) -> Result<Action> {
    let key = sa.object_key();

    if !ctx.gate.admit(&key, TriggerSnapshot::of(&sa)) {
        debug!("No relevant change on ServiceAccount {}, skipping", key);
        return Ok(Action::await_change());
    }

    let verdict = ctx.reconcile_key(&key).await;
    ctx.gate.settle(&key, verdict);
    Ok(verdict.into())
}

fn error_policy(
    _sa: Arc<ServiceAccount>,
    error: &PiaError,
    _ctx: Arc<ServiceAccountReconciler>,
) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(error_policy_delay())
}
