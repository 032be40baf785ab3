// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{retry, DEFAULT_AWS_REGION};
use crate::error::{PiaError, Result};
use crate::retry::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// EKS cluster that owns the Pod Identity Associations
    pub cluster_name: String,
    pub aws_region: String,
    /// Verbose logging when no RUST_LOG is given
    pub dev_mode: bool,
    pub retry_policy: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cluster_name = lookup("CLUSTER_NAME")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PiaError::ConfigError("CLUSTER_NAME environment variable not set".to_string())
            })?;

        let aws_region = lookup("AWS_REGION")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());

        let dev_mode = parse_or(&lookup, "DEV_MODE", false)?;

        let base_delay = parse_or(&lookup, "RETRY_BASE_DELAY_SECS", retry::BASE_DELAY_SECS)?;
        let max_delay = parse_or(&lookup, "RETRY_MAX_DELAY_SECS", retry::MAX_DELAY_SECS)?;
        let max_attempts = parse_or(&lookup, "RETRY_MAX_ATTEMPTS", retry::MAX_ATTEMPTS)?;

        if base_delay == 0 || base_delay > max_delay {
            return Err(PiaError::ConfigError(format!(
                "RETRY_BASE_DELAY_SECS ({}) must be positive and not exceed RETRY_MAX_DELAY_SECS ({})",
                base_delay, max_delay
            )));
        }

        Ok(Config {
            cluster_name,
            aws_region,
            dev_mode,
            retry_policy: RetryPolicy::new(
                Duration::from_secs(base_delay),
                Duration::from_secs(max_delay),
                max_attempts,
            ),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            PiaError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))
        }),
        _ => Ok(default),
    }
}
