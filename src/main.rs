// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pia_operator::aws::EksAssociationClient;
use pia_operator::config::Config;
use pia_operator::kubernetes::KubeServiceAccountClient;
use pia_operator::reconcilers::ServiceAccountReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env().context("failed to load configuration")?;

    // RUST_LOG wins over the dev mode default
    let default_level = if config.dev_mode { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Pod Identity Association operator");
    info!(
        "Configuration loaded: cluster_name={}, aws_region={}, dev_mode={}",
        config.cluster_name, config.aws_region, config.dev_mode
    );

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let associations =
        EksAssociationClient::from_region(&config.aws_region, &config.cluster_name).await;
    info!("Managing Pod Identity Associations of EKS cluster {}", associations.cluster_name());

    let reconciler = ServiceAccountReconciler::new(
        Arc::new(KubeServiceAccountClient::new(client.clone())),
        Arc::new(associations),
        config.retry_policy,
    );

    info!("Starting ServiceAccount reconciler...");
    reconciler.run(client).await?;

    // This should never be reached as the reconciler runs forever
    warn!("Reconciler stopped unexpectedly");
    Ok(())
}
