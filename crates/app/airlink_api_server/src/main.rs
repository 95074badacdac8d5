//! Airlink Panel API server binary.
//!
//! `serve` (the default) runs the HTTP API. The other subcommands are
//! operator tasks against the same database.

use std::net::SocketAddr;
use std::time::Duration;

use airlink_api::config::{ApiConfig, ConfigError};
use airlink_api::{AppState, router};
use airlink_core::store::PgStore;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "airlink_api_server", about = "Airlink Panel API server")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Port to listen on; overrides the port of `BIND_ADDR`.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/airlink",
        global = true
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5, global = true)]
    max_connections: u32,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Create an API key and print its plaintext once.
    CreateApiKey {
        #[arg(long)]
        name: String,
        /// Permission granted to the key; repeatable.
        #[arg(long = "permission")]
        permissions: Vec<String>,
        /// Lifetime in seconds; omit for a key that never expires.
        #[arg(long)]
        expires_in: Option<i64>,
    },
    /// Add an IP address to the blacklist.
    BlockIp {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,airlink_api=debug,airlink_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            // A missing secret aborts before the database is touched.
            let config = serve_config(args.database_url, args.port)?;
            let pool = connect(&config.database_url, args.max_connections).await?;
            serve(pool, config).await
        }
        Command::CreateApiKey {
            name,
            permissions,
            expires_in,
        } => {
            let expires = key_expiry(Utc::now(), expires_in)?;
            let pool = connect(&args.database_url, args.max_connections).await?;
            let (plaintext, key) = PgStore::new(pool)
                .create_api_key(&name, &permissions, expires)
                .await?;
            info!(id = key.id, name = %key.name, "api key created");
            // Only time the plaintext is ever shown.
            println!("{plaintext}");
            Ok(())
        }
        Command::BlockIp { ip, reason } => {
            let pool = connect(&args.database_url, args.max_connections).await?;
            PgStore::new(pool).block_ip(&ip, reason.as_deref()).await?;
            info!(%ip, "ip blacklisted");
            Ok(())
        }
    }
}

/// Open the pool and run migrations.
async fn connect(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, Box<dyn std::error::Error>> {
    info!(max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    info!("running database migrations");
    airlink_api::migrate(&pool).await?;
    Ok(pool)
}

fn serve_config(database_url: String, port: Option<u16>) -> Result<ApiConfig, ConfigError> {
    let mut config = ApiConfig::from_env()?;
    config.database_url = database_url;
    if let Some(port) = port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map_or("127.0.0.1", |(host, _)| host);
        config.bind_addr = format!("{host}:{port}");
    }
    Ok(config)
}

/// Absolute expiry for `--expires-in`. Rejects non-positive and out-of-range values.
fn key_expiry(
    now: DateTime<Utc>,
    expires_in: Option<i64>,
) -> Result<Option<DateTime<Utc>>, String> {
    expires_in
        .map(|secs| {
            chrono::Duration::try_seconds(secs)
                .filter(|_| secs > 0)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or_else(|| format!("--expires-in {secs} is out of range"))
        })
        .transpose()
}

async fn serve(pool: PgPool, config: ApiConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.development {
        warn!("development mode: internal error detail is exposed in responses");
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState::postgres(pool, config);
    let limiter = state.rate_limiter.clone();
    let security_log = state.security_log.clone();
    let app = router(state);

    // Closed rate-limit windows are dropped once per window.
    let shutdown = CancellationToken::new();
    let purge = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let mut ticker = tokio::time::interval(limiter.window().max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = limiter.purge_expired();
                        if purged > 0 {
                            info!(purged, tracked = limiter.tracked(), "purged rate-limit windows");
                        }
                    }
                }
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                shutdown.cancelled().await;
            }
            info!("shutting down");
        }
    })
    .await;

    shutdown.cancel();
    let _ = purge.await;

    // Events still queued are written before the runtime stops.
    security_log.flush().await;
    info!("security log flushed");

    result?;
    Ok(())
}
