// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-running modes: the gateway server, the dispatch worker, and the
//! one-shot `process-due` pass.

use std::sync::Arc;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::{CommunicationStore, CourierError};
use courier_dispatch::{Courier, Worker};
use courier_gateway::{AuthConfig, GatewayState, ServerConfig};
use courier_storage::SqliteStorage;
use courier_vault::SecretSealer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::shutdown;

/// Initialize the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

/// Storage plus a `Courier` wired from config.
struct Runtime {
    storage: Arc<SqliteStorage>,
    courier: Courier,
}

impl Runtime {
    async fn open(config: &CourierConfig) -> Result<Self, CourierError> {
        let storage = Arc::new(SqliteStorage::open(&config.storage).await?);
        info!(path = %config.storage.database_path, "storage opened");

        let sealer = SecretSealer::from_env(&config.vault)?.map(Arc::new);
        if sealer.is_none() {
            warn!("no vault passphrase available, sealed settings values will be ignored");
        }

        let store: Arc<dyn CommunicationStore> = storage.clone();
        let courier = Courier::from_config(config, store, None, sealer);
        Ok(Self { storage, courier })
    }

    async fn close(self) {
        drop(self.courier);
        match Arc::try_unwrap(self.storage) {
            Ok(storage) => {
                if let Err(e) = storage.close().await {
                    error!(error = %e, "failed to close storage cleanly");
                }
            }
            Err(_) => warn!("storage still shared at shutdown, skipping explicit close"),
        }
    }
}

fn tick_interval(config: &CourierConfig) -> Duration {
    Duration::from_secs(config.scheduler.tick_interval_secs.max(1))
}

fn build_worker(courier: &Courier, config: &CourierConfig) -> Worker {
    courier
        .worker(tick_interval(config))
        .with_max_jobs(config.scheduler.batch_size)
        .with_job_retention(Duration::from_secs(
            config.scheduler.job_retention_hours.saturating_mul(3600),
        ))
}

/// `courier serve`: gateway plus (optionally) the worker, until a signal.
pub async fn run_serve(config: CourierConfig, with_worker: bool) -> Result<(), CourierError> {
    info!(service = %config.service.name, "starting courier");
    let runtime = Runtime::open(&config).await?;
    let cancel = shutdown::install_signal_handler();

    let worker_handle = with_worker.then(|| {
        let worker = build_worker(&runtime.courier, &config);
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    });

    if config.gateway.enabled {
        let state = GatewayState::new(
            runtime.courier.clone(),
            AuthConfig {
                bearer_token: config.gateway.bearer_token.clone(),
            },
        )
        .with_public_base_url(config.gateway.public_base_url.clone());
        let server = ServerConfig {
            host: config.gateway.host.clone(),
            port: config.gateway.port,
        };
        if let Err(e) = courier_gateway::start_server(&server, state, cancel.clone()).await {
            error!(error = %e, "gateway failed");
            cancel.cancel();
        }
    } else {
        info!("gateway disabled");
        cancel.cancelled().await;
    }

    if let Some(handle) = worker_handle
        && let Err(e) = handle.await
    {
        error!(error = %e, "worker task panicked");
    }

    runtime.close().await;
    info!("courier stopped");
    Ok(())
}

/// `courier worker`: scheduled sends and retries only.
pub async fn run_worker(config: CourierConfig) -> Result<(), CourierError> {
    let runtime = Runtime::open(&config).await?;
    let cancel = shutdown::install_signal_handler();
    build_worker(&runtime.courier, &config).run(cancel).await;
    runtime.close().await;
    Ok(())
}

/// `courier process-due`: one scheduled-send pass and one job drain.
pub async fn run_process_due(config: CourierConfig) -> Result<(), CourierError> {
    let runtime = Runtime::open(&config).await?;
    let report = build_worker(&runtime.courier, &config).tick().await?;
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| CourierError::Internal(format!("failed to render report: {e}")))?;
    println!("{json}");
    runtime.close().await;
    Ok(())
}
