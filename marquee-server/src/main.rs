//! # Marquee Server
//!
//! Listens for Plex webhooks and keeps movie labels in sync with IMDb
//! keywords.
//!
//! ## Commands
//!
//! - `serve` (default): HTTP endpoints plus the label worker pool
//! - `worker`: worker pool only
//! - `check`: verify the queue broker and Plex, then exit
//! - `enqueue <rating_key> <imdb_id>`: queue one manual update

use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use marquee_config::{Config, ConfigLoad, ConfigLoader, QueueBackend};
use marquee_core::types::{ImdbId, MovieEvent, RatingKey};
use marquee_server::{
    create_app,
    infra::{startup::Components, telemetry::init_tracing},
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "marquee-server", version)]
#[command(about = "Labels new Plex movies with their IMDb keywords")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to a marquee.toml configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Queue backend override (redis or memory)
    #[arg(long, global = true)]
    queue: Option<QueueBackend>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve HTTP endpoints and run the worker pool
    Serve(ServeArgs),
    /// Run the worker pool without HTTP endpoints
    Worker,
    /// Check queue broker and Plex connectivity, exiting non-zero on failure
    Check,
    /// Queue a manual label update without going through HTTP
    Enqueue {
        rating_key: String,
        imdb_id: String,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct ServeArgs {
    /// Accept requests but leave processing to separate `worker` processes
    #[arg(long, default_value_t = false)]
    no_workers: bool,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => run_server(config, args).await,
        Command::Worker => run_workers(config).await,
        Command::Check => run_check(config).await,
        Command::Enqueue {
            rating_key,
            imdb_id,
        } => run_enqueue(config, &rating_key, &imdb_id).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }

    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;
    if let Some(backend) = cli.queue {
        config.queue.backend = backend;
    }

    init_tracing(config.logging.format);

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }

    Ok(config)
}

async fn run_server(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let components = Components::build(&config).await?;
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let workers = if args.no_workers {
        info!("worker pool disabled; tasks are only queued");
        Vec::new()
    } else {
        components.worker_pool().spawn(shutdown.clone())
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Starting Marquee server");

    let app = create_app(components.app_state());
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    join_workers(workers).await;
    result.context("HTTP server failed")
}

async fn run_workers(config: Config) -> anyhow::Result<()> {
    let components = Components::build(&config).await?;
    if config.queue.backend == QueueBackend::Memory {
        warn!("worker-only mode with the memory queue will never receive tasks");
    }

    let shutdown = CancellationToken::new();
    let workers = components.worker_pool().spawn(shutdown.clone());
    shutdown_signal(shutdown).await;
    join_workers(workers).await;
    Ok(())
}

async fn run_check(config: Config) -> anyhow::Result<()> {
    let components = Components::build(&config).await?;
    let mut failures = Vec::new();

    match components.queue.ping().await {
        Ok(()) => info!(backend = %config.queue.backend, "queue broker reachable"),
        Err(err) => {
            error!(error = %err, "queue broker check failed");
            failures.push("queue");
        }
    }

    let catalog = components.catalog.check_connectivity().await;
    if catalog.is_healthy() {
        info!(url = %config.plex.url, "Plex reachable");
    } else {
        error!(status = ?catalog, "Plex check failed");
        failures.push("catalog");
    }

    if !failures.is_empty() {
        bail!("connectivity check failed: {}", failures.join(", "));
    }
    Ok(())
}

async fn run_enqueue(
    config: Config,
    rating_key: &str,
    imdb_id: &str,
) -> anyhow::Result<()> {
    if config.queue.backend == QueueBackend::Memory {
        bail!("enqueue needs a shared queue; the memory backend is process-local");
    }
    let rating_key = RatingKey::parse(rating_key)?;
    let imdb_id = ImdbId::parse(imdb_id)?;
    let event = MovieEvent::manual_update(rating_key, Some(imdb_id))?;

    let components = Components::build(&config).await?;
    let receipt = components.app_state().enqueuer().submit(event).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn join_workers(handles: Vec<JoinHandle<()>>) {
    for result in futures::future::join_all(handles).await {
        if let Err(err) = result {
            error!(error = %err, "worker task panicked");
        }
    }
    info!("worker pool stopped");
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = token.cancelled() => return,
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received; finishing in-flight tasks");
    token.cancel();
}
