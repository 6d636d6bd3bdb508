//! Nginx Controller
//!
//! Kubernetes operator for `Nginx` resources (`nginx.tsuru.io/v1alpha1`):
//! - Converges each `Nginx` into a Deployment, Service and optional Ingress
//! - Reports replicas, addresses and pods back into its status
//! - Maintains Endpoints for Services that opt out of the pod selector

mod annotation_filter;
mod backoff;
mod config;
mod controller;
mod endpoints;
mod error;
mod events;
mod reconcile_helpers;
#[cfg(test)]
mod reconcile_helpers_test;
mod reconciler;
mod resources;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Nginx Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!(
        "  Annotation filter: {}",
        if config.annotation_filter.is_empty() { "none" } else { "set" }
    );
    info!("  Sync period: {:?}", config.sync_period);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Endpoints controller: {}", config.endpoints_controller_enabled);
    info!("  GCP project: {}", config.gcp_project.as_deref().unwrap_or("none"));

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
