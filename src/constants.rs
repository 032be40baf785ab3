// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// ServiceAccount annotation keys used by the operator
pub mod annotations {
    /// Common prefix of every operator annotation
    pub const PREFIX: &str = "pia-operator.eks.aws.com/";
    /// ARN of the IAM role to bind (required to own an association)
    pub const ROLE: &str = "pia-operator.eks.aws.com/role";
    /// ARN of a role to assume on top of the base role (optional)
    pub const ASSUME_ROLE: &str = "pia-operator.eks.aws.com/assume-role";
    /// Anything but the literal "false" keeps descriptive tags enabled
    pub const TAGGING: &str = "pia-operator.eks.aws.com/tagging";
    /// Cached id of the Pod Identity Association, written by the operator only
    pub const ASSOCIATION_ID: &str = "pia-operator.eks.aws.com/association-id";

    /// Annotations removed from a ServiceAccount when its association is released.
    /// Role and tagging belong to the user and are left alone.
    pub const RELEASED_ON_CLEANUP: [&str; 2] = [ASSUME_ROLE, ASSOCIATION_ID];
}

/// Finalizer that gates ServiceAccount deletion until the association is gone
pub const FINALIZER: &str = "pia-operator.eks.aws.com/finalizer";

/// The operator name, used as field manager and in the `managed-by` tag
pub const OPERATOR_NAME: &str = "pia-operator";

/// Descriptive tag keys attached to associations when tagging is enabled
pub mod tags {
    pub const MANAGED_BY: &str = "managed-by";
    pub const SERVICE_ACCOUNT: &str = "serviceaccount";
    pub const NAMESPACE: &str = "namespace";
    pub const BASE_ROLE: &str = "base-role";
    pub const ASSUME_ROLE: &str = "assume-role";

    /// Every key the operator owns on an association
    pub const MANAGED: [&str; 5] = [
        MANAGED_BY,
        SERVICE_ACCOUNT,
        NAMESPACE,
        BASE_ROLE,
        ASSUME_ROLE,
    ];
}

/// Retry policy defaults
pub mod retry {
    /// First backoff delay in seconds
    pub const BASE_DELAY_SECS: u64 = 30;
    /// Maximum backoff delay in seconds (exponential backoff cap)
    pub const MAX_DELAY_SECS: u64 = 300;
    /// Transient failures tolerated per object before the capped delay is used
    pub const MAX_ATTEMPTS: u32 = 5;
}

/// Requeue delay used when a reconcile unexpectedly returns an error
pub const ERROR_POLICY_REQUEUE_SECS: u64 = 60;

/// Region used when AWS_REGION is not set
pub const DEFAULT_AWS_REGION: &str = "eu-west-1";
