//! Main controller implementation.
//!
//! Builds the API-backed stores, the event publisher and the optional GCP
//! client, then runs the `Nginx` and Endpoints watchers as background
//! tasks until one of them exits.

use crate::config::ControllerConfig;
use crate::endpoints::EndpointsReconciler;
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_client::KubeObjectStore;
use gcp_client::{GcpClient, GlobalAddressManager};
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

type WatcherHandle = JoinHandle<Result<(), ControllerError>>;

/// Main controller for `Nginx` resources.
#[derive(Debug)]
pub struct Controller {
    nginx_watcher: WatcherHandle,
    endpoints_watcher: Option<WatcherHandle>,
}

impl Controller {
    /// Creates a new controller instance and starts its watchers.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Nginx Controller");

        let client = Client::try_default().await?;
        let field_manager = config.controller_name.clone();

        let address_manager: Option<Arc<dyn GlobalAddressManager>> = match &config.gcp_project {
            Some(project) => {
                info!("IPv6 global addresses enabled for GCP project {}", project);
                let gcp = GcpClient::new(
                    project.clone(),
                    config.gcp_compute_endpoint.clone(),
                    config.gcp_metadata_endpoint.clone(),
                )?;
                Some(Arc::new(gcp))
            }
            None => None,
        };

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeObjectStore::new(client.clone(), field_manager.clone())),
            Arc::new(KubeObjectStore::new(client.clone(), field_manager.clone())),
            Arc::new(KubeObjectStore::new(client.clone(), field_manager.clone())),
            Arc::new(KubeObjectStore::new(client.clone(), field_manager.clone())),
            Arc::new(KubeObjectStore::new(client.clone(), field_manager.clone())),
            Arc::new(KubeEventPublisher::new(client.clone(), &config.controller_name)),
            address_manager,
            config.clone(),
        ));

        let endpoints_reconciler = Arc::new(EndpointsReconciler::new(
            Arc::new(KubeObjectStore::new(client.clone(), field_manager.clone())),
            Arc::new(KubeObjectStore::new(client.clone(), field_manager.clone())),
            Arc::new(KubeObjectStore::new(client.clone(), field_manager)),
            config.sync_period,
        ));

        let endpoints_enabled = config.endpoints_controller_enabled;
        let watcher = Arc::new(Watcher::new(client, config, reconciler, endpoints_reconciler));

        let nginx_watcher = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.watch_nginxes().await })
        };

        let endpoints_watcher = if endpoints_enabled {
            let watcher = Arc::clone(&watcher);
            Some(tokio::spawn(async move { watcher.watch_endpoints().await }))
        } else {
            info!("Endpoints controller disabled");
            None
        };

        Ok(Self {
            nginx_watcher,
            endpoints_watcher,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Nginx Controller running");

        let Self {
            mut nginx_watcher,
            endpoints_watcher,
        } = self;
        let endpoints_watcher = async move {
            match endpoints_watcher {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        };

        // Wait for any watcher to exit (they should run forever)
        tokio::select! {
            result = &mut nginx_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Nginx watcher panicked: {e}")))??;
            }
            result = endpoints_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Endpoints watcher panicked: {e}")))??;
            }
        }

        Ok(())
    }
}
