use crate::config::Config;
use crate::server::HttpServer;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};
use tumour_prediction::{InferenceService, ModelProvisioner, OrtModelLoader};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let loader = OrtModelLoader::new(config.model.num_instances);
    let provisioner = match ModelProvisioner::new(&config.model, &config.download, loader) {
        Ok(provisioner) => Arc::new(provisioner),
        Err(e) => {
            tracing::error!("Failed to initialize model provisioner: {:?}", e);
            return Err(Box::new(e));
        }
    };

    // Provision in the background; requests arriving meanwhile wait for it.
    tokio::spawn({
        let provisioner = provisioner.clone();
        async move {
            match provisioner.acquire().await {
                Ok(_) => tracing::info!("Model ready"),
                Err(e) => tracing::error!(
                    "Model unavailable, predictions will fail until restart: {}",
                    e
                ),
            }
        }
    });

    let inference_service = InferenceService::new(provisioner);
    let server = HttpServer::new(inference_service, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
