// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PiaError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("AWS EKS error: {0}")]
    AwsError(#[from] AwsError),

    #[error("Pod Identity Association not found for ServiceAccount {namespace}/{name}")]
    AssociationNotFound { namespace: String, name: String },

    #[error("Invalid annotation: {0}")]
    InvalidAnnotation(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, PiaError>;

/// Failure reported by the EKS API, reduced to what the retry policy needs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed ({kind}): {message}")]
pub struct AwsError {
    pub operation: &'static str,
    pub kind: AwsErrorKind,
    pub message: String,
}

impl AwsError {
    pub fn new(operation: &'static str, kind: AwsErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwsErrorKind {
    NotFound,
    InvalidRequest,
    Throttled,
    Unavailable,
    Timeout,
    InUse,
    Other,
}

impl AwsErrorKind {
    /// Map an EKS error code (e.g. `ResourceNotFoundException`) to a kind
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("ResourceNotFoundException" | "NotFoundException") => Self::NotFound,
            Some(
                "InvalidParameterException" | "InvalidRequestException" | "ValidationException"
                | "BadRequestException",
            ) => Self::InvalidRequest,
            Some("ThrottlingException" | "TooManyRequestsException" | "RequestLimitExceeded") => {
                Self::Throttled
            }
            Some("ServerException" | "ServiceUnavailableException" | "InternalFailure") => {
                Self::Unavailable
            }
            Some("RequestTimeout" | "RequestTimeoutException") => Self::Timeout,
            Some("ResourceInUseException") => Self::InUse,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for AwsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::InvalidRequest => "invalid request",
            Self::Throttled => "throttled",
            Self::Unavailable => "service unavailable",
            Self::Timeout => "timeout",
            Self::InUse => "resource in use",
            Self::Other => "unexpected error",
        };
        f.write_str(s)
    }
}

/// How a failure should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Do not retry until the object changes again
    Permanent,
    /// Retry with exponential backoff
    Transient,
    /// Retry immediately without counting the attempt
    Retryable,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Permanent => "permanent",
            Self::Transient => "transient",
            Self::Retryable => "retryable",
        })
    }
}

impl PiaError {
    /// Classify this failure for the retry policy
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::KubeError(err) => classify_kube_error(err),
            Self::AwsError(err) => match err.kind {
                AwsErrorKind::NotFound | AwsErrorKind::InvalidRequest => ErrorClass::Permanent,
                AwsErrorKind::Throttled
                | AwsErrorKind::Unavailable
                | AwsErrorKind::Timeout
                | AwsErrorKind::InUse
                | AwsErrorKind::Other => ErrorClass::Transient,
            },
            Self::AssociationNotFound { .. } | Self::InvalidAnnotation(_) | Self::ConfigError(_) => {
                ErrorClass::Permanent
            }
        }
    }

    /// True when the EKS API reported the association as absent
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, Self::AwsError(err) if err.kind == AwsErrorKind::NotFound)
    }
}

fn classify_kube_error(err: &kube::Error) -> ErrorClass {
    let kube::Error::Api(response) = err else {
        // Transport and client-side failures
        return ErrorClass::Transient;
    };

    match response.code {
        400 | 404 | 422 => ErrorClass::Permanent,
        409 => ErrorClass::Retryable,
        // 429, 503, 504 and everything unrecognised back off
        _ => ErrorClass::Transient,
    }
}
