// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{error::Error, net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kyc_server::{
    api::router,
    config::KycConfig,
    crypto::FieldCipher,
    logging,
    providers::ProviderRegistry,
    queue::SimulationQueue,
    service::{Collaborators, KycService, ServiceSettings, TracingNotifier},
    simulation_worker::SimulationWorker,
    state::AppState,
    storage::{FileApplicationStore, FileAuditSink, FileStorage, FsDocumentStore, StoragePaths},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = KycConfig::from_env()?;
    logging::init(config.log_format)?;

    info!(
        environment = %config.environment,
        data_dir = %config.data_dir.display(),
        default_provider = %config.providers.default_provider,
        "Starting KYC orchestration service"
    );
    if config.allow_unsigned_webhooks {
        warn!("Unsigned webhooks are ACCEPTED for adapters without a secret");
    }

    let paths = StoragePaths::new(&config.data_dir);
    let mut storage = FileStorage::new(paths.clone());
    storage.initialize()?;
    let storage = Arc::new(storage);

    let queue = Arc::new(SimulationQueue::open(&paths.queue_db())?);
    let registry = ProviderRegistry::from_config(&config.providers)?;
    for kind in kyc_server::providers::ProviderKind::ALL {
        if let Some(adapter) = registry.get(kind) {
            info!(
                provider = %kind,
                simulated = adapter.is_simulated(),
                "Verification provider registered"
            );
        }
    }

    let service = KycService::new(
        Collaborators {
            store: Arc::new(FileApplicationStore::new(storage.clone())),
            audit: Arc::new(FileAuditSink::new(storage.clone())),
            notifier: Arc::new(TracingNotifier),
            documents: Arc::new(FsDocumentStore::new(storage.clone())),
        },
        registry,
        FieldCipher::new(&config.encryption_key),
        ServiceSettings::from_config(&config),
    )
    .with_queue(queue.clone());
    let service = Arc::new(service);

    let shutdown = CancellationToken::new();
    let worker = SimulationWorker::new(service.clone(), queue);
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let app = router(AppState::new(service).with_storage(storage));
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "KYC service listening (docs at /docs)");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        warn!(error = %e, "Simulation worker ended abnormally");
    }
    info!("KYC service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
    info!("Shutdown signal received");
}
