//! Riverwatch collector entry point.
//!
//! Startup order: HTTP client pair → publisher → ingress server → inventory
//! loop → poller and subscription manager. SIGINT/SIGTERM triggers the
//! orderly drain: loops exit, poll workers finish queued jobs, the publisher
//! flushes within its deadline, the ingress server shuts down gracefully.

use anyhow::Context;
use riverwatch_client::{HsmClient, HttpClientPair, RetryPolicy, VaultClient};
use riverwatch_collector::config::{self, CollectorConfig};
use riverwatch_collector::subscriptions::SubscriptionManager;
use riverwatch_collector::{inventory, metrics, poller};
use riverwatch_core::{CollectorError, Inventory};
use riverwatch_kafka::{Publisher, parse_broker_list};
use riverwatch_web::{AppState, Readiness};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    let directive = match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARN" => "warn",
        "ERROR" | "FATAL" | "PANIC" => "error",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(directive))
        .init();
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let ctrl_c = tokio::signal::ctrl_c();

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable, handling Ctrl-C only");
            let _ = ctrl_c.await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = CollectorConfig::from_env().context("configuration")?;
    metrics::register_metrics();

    info!(
        polling = config.polling_enabled,
        subscriptions = config.rf_subscribe_enabled,
        rest = config.rest_enabled,
        vault = config.vault_enabled,
        "starting riverwatch collector"
    );

    // HTTP client pair. The permissive client is mandatory; the validated
    // client is best-effort within its startup retry window.
    let http = Arc::new(
        HttpClientPair::new(
            config.http_timeout,
            RetryPolicy::default(),
            config.log_insecure_failover,
        )
        .context("HTTP client pair")?,
    );
    if config.ca_uri.is_empty() {
        info!("no CA bundle configured, validated client disabled");
    } else {
        let ca_uri = config.ca_uri.clone();
        let load = move || {
            std::fs::read(&ca_uri)
                .map_err(|e| CollectorError::Transport(format!("read CA bundle {ca_uri}: {e}")))
        };
        match http
            .reload_trust_with_retry(
                load,
                config::TRUST_BUILD_ATTEMPTS,
                config::TRUST_BUILD_INTERVAL,
            )
            .await
        {
            Ok(()) => info!(ca_uri = %config.ca_uri, "validated HTTP client ready"),
            Err(err) => warn!(
                error = %err,
                "validated client unavailable, proceeding with permissive client only"
            ),
        }
    }

    // Publisher.
    let broker_list = std::fs::read(&config.kafka_brokers_config)
        .with_context(|| format!("read broker list {}", config.kafka_brokers_config))?;
    let brokers = parse_broker_list(&broker_list).context("broker list")?;
    let publisher = Arc::new(Publisher::new(&brokers, Duration::from_secs(5)).context("publisher")?);

    let inventory_map = Arc::new(Inventory::new());
    let readiness = Arc::new(Readiness::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Ingress server. Probes are always served; the events route only when
    // REST ingress is enabled.
    let state = Arc::new(AppState {
        inventory: Arc::clone(&inventory_map),
        publisher: Arc::clone(&publisher),
        readiness: Arc::clone(&readiness),
        ignore_provided_timestamp: config.ignore_provided_timestamp,
    });
    let router = riverwatch_web::router(state, &config.events_path(), config.rest_enabled);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.rest_port))
        .await
        .with_context(|| format!("bind port {}", config.rest_port))?;
    info!(port = config.rest_port, "ingress server listening");
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await;
        if let Err(err) = result {
            error!(error = %err, "ingress server failed");
        }
    });

    let mut tasks: JoinSet<()> = JoinSet::new();

    // Inventory loop.
    if !config.sm_url.is_empty() {
        let hsm = HsmClient::new(config.sm_url.clone());
        let vault = config.vault_enabled.then(|| {
            VaultClient::new(
                config.vault_addr.clone(),
                config.vault_keypath.clone(),
                config.vault_token.clone(),
            )
        });
        tasks.spawn(inventory::run_inventory_loop(
            Arc::clone(&inventory_map),
            Arc::clone(&http),
            hsm,
            vault,
            Arc::clone(&readiness),
            config.hsm_refresh_interval,
            shutdown_rx.clone(),
        ));
    }

    // Poller: worker pool plus the tick loop feeding it.
    let mut workers: JoinSet<()> = JoinSet::new();
    if config.polling_enabled {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.worker_count);
        workers = poller::spawn_workers(
            config.worker_count,
            jobs_rx,
            Arc::clone(&http),
            Arc::clone(&publisher),
            Arc::clone(&inventory_map),
        );
        tasks.spawn(poller::run_poll_loop(
            Arc::clone(&inventory_map),
            jobs_tx,
            config.polling_interval,
            shutdown_rx.clone(),
        ));
    }

    // Subscription manager.
    if config.rf_subscribe_enabled {
        let manager = Arc::new(SubscriptionManager::new(
            Arc::clone(&http),
            Arc::clone(&inventory_map),
            config.rest_url.clone(),
        ));
        tasks.spawn(manager.run(config.hsm_refresh_interval, shutdown_rx.clone()));
    }

    // Supervise: the first signal or background failure starts the drain. A
    // panicked task is logged and converted into a graceful shutdown.
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        Some(result) = tasks.join_next() => match result {
            Ok(()) => warn!("background task exited early, shutting down"),
            Err(err) => error!(error = %err, "background task panicked, shutting down"),
        },
    }

    let _ = shutdown_tx.send(true);

    // Loops observe the signal and exit; dropping the poll sender closes the
    // job channel so workers drain whatever is queued.
    while let Some(result) = tasks.join_next().await {
        if let Err(err) = result {
            error!(error = %err, "background task panicked during drain");
        }
    }
    while let Some(result) = workers.join_next().await {
        if let Err(err) = result {
            error!(error = %err, "poll worker panicked during drain");
        }
    }

    let report = publisher.flush(config::FLUSH_DEADLINE).await;
    if report.abandoned > 0 {
        warn!(
            abandoned = report.abandoned,
            "flush deadline expired with events unflushed"
        );
    } else {
        info!("publisher flushed clean");
    }

    let _ = server.await;
    info!("riverwatch collector stopped");
    Ok(())
}
