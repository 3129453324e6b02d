//! Felicity engine process.
//!
//! Connects to `PostgreSQL`, applies migrations, exposes Prometheus metrics
//! and keeps complete teams reconciled until it is asked to stop.

use felicity_core::environment::SystemClock;
use felicity_core::ticket::{NoopRenderer, TicketRenderer};
use felicity_engine::{Config, Engine, EngineEnvironment, HttpQrRenderer, metrics};
use felicity_postgres::PostgresStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);
const RENDER_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(config.log_filter()?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Felicity engine");
    info!(
        max_connections = config.postgres.max_connections,
        ticket_prefix = %config.tickets.prefix,
        render_enabled = config.tickets.render_enabled,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(config.connect_timeout())
        .connect(&config.postgres.url)
        .await?;
    let store = PostgresStore::from_pool(pool);
    store.migrate().await?;
    info!("Database ready");

    metrics::install_exporter(config.metrics_addr()?)?;

    let renderer: Arc<dyn TicketRenderer> = if config.tickets.render_enabled {
        Arc::new(HttpQrRenderer::new(RENDER_TIMEOUT)?)
    } else {
        Arc::new(NoopRenderer)
    };
    let env = EngineEnvironment::new(Arc::new(store))
        .with_clock(Arc::new(SystemClock))
        .with_renderer(renderer)
        .with_issuer(config.ticket_issuer())
        .with_retry_policy(config.retry_policy());
    let engine = Engine::new(env);

    let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine.reconcile_completed_teams().await {
                    error!(error = %e, "Team reconciliation failed");
                }
            }
            () = &mut shutdown => break,
        }
    }

    info!("Felicity engine stopped");
    Ok(())
}

/// Graceful shutdown signal handler.
///
/// Waits for:
/// - Ctrl+C (SIGINT)
/// - SIGTERM (in production environments)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
