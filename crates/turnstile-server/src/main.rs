use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use turnstile_core::{TokenValidator, TokenVerdict};
use turnstile_server::cli::{Cli, Command};
use turnstile_server::config::{AppConfig, LogFormat};
use turnstile_server::events::{EventIngestor, notification_queue, spawn_ingest_worker};
use turnstile_server::gc;
use turnstile_server::metrics::Metrics;
use turnstile_server::rest;
use turnstile_server::service::AuthorizationDecisionService;
use turnstile_storage::EntitlementStore;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(feature = "telemetry")]
use turnstile_server::telemetry;

const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    // OTel layer is typed to bare Registry, so it must be added first.
    // Layer order (bottom to top): Registry → OTel → EnvFilter → fmt
    let registry = tracing_subscriber::registry();

    #[cfg(feature = "telemetry")]
    let otel_provider = telemetry::init_telemetry(&config.tracing);

    #[cfg(feature = "telemetry")]
    let otel_layer = otel_provider.as_ref().map(telemetry::make_otel_layer);

    #[cfg(feature = "telemetry")]
    let registry = registry.with(otel_layer);

    let registry = registry.with(filter);

    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty();
            registry.with(fmt_layer).init();
        }
    }

    #[cfg(feature = "telemetry")]
    if otel_provider.is_some() {
        tracing::info!("OpenTelemetry tracing enabled");
    }

    // Keep the provider alive for the process lifetime.
    #[cfg(feature = "telemetry")]
    if let Some(provider) = otel_provider {
        std::mem::forget(provider);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Some(Command::VerifyToken { token }) => run_verify_token(&config, &token),
        Some(Command::Serve) | None => run_serve(config).await,
    }
}

fn load_validator(config: &AppConfig) -> TokenValidator {
    TokenValidator::from_key_file(&config.token.public_key_path)
        .with_leeway(config.token.leeway_secs)
}

fn run_verify_token(config: &AppConfig, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let validator = load_validator(config);

    match validator.validate(token) {
        TokenVerdict::Valid { claims } => {
            println!("Token is valid");
            println!("{}", serde_json::to_string_pretty(&claims)?);
            Ok(())
        }
        TokenVerdict::Invalid { reason } => {
            eprintln!("Token rejected: {reason}");
            std::process::exit(1);
        }
    }
}

async fn run_serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        http_addr = %config.http_addr(),
        channel = %config.notifications.channel,
        "starting turnstile"
    );

    let store = Arc::new(EntitlementStore::new());
    let metrics = Arc::new(Metrics::new());

    let validator = load_validator(&config);
    let service = Arc::new(
        AuthorizationDecisionService::new(Arc::clone(&store), validator)
            .with_metrics(Arc::clone(&metrics)),
    );

    let ingestor = EventIngestor::new(Arc::clone(&store), config.notifications.channel.clone())
        .with_metrics(Arc::clone(&metrics));
    let (sender, receiver) = notification_queue(config.notifications.queue_capacity);
    let ingest_worker = spawn_ingest_worker(ingestor, receiver);

    let purge_task = config.purge_interval().map(|interval| {
        gc::spawn_purge_task(
            Arc::clone(&store),
            Arc::clone(&metrics),
            config.removal_retention(),
            interval,
        )
    });

    let state = rest::AppState::new(service, Arc::clone(&store), sender, Arc::clone(&metrics))
        .with_api_id_header(config.api_id_header())
        .with_decision_timeout(config.decision_timeout());
    let router = rest::create_router(state);

    let http_addr: std::net::SocketAddr = config.http_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(%http_addr, "HTTP server listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "HTTP server error");
    }

    if let Some(task) = purge_task {
        task.abort();
    }
    // The router owned the last sender; the worker drains what is queued and exits.
    match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, ingest_worker).await {
        Ok(Ok(processed)) => tracing::info!(processed, "ingest worker finished"),
        Ok(Err(e)) => tracing::warn!(error = %e, "ingest worker did not finish cleanly"),
        Err(_) => tracing::warn!("ingest worker still draining at shutdown, abandoning queue"),
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => { tracing::info!("received SIGINT"); }
                _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler, using SIGINT only");
            let _ = ctrl_c.await;
            tracing::info!("received SIGINT");
        }
    }
}
