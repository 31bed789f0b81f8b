mod collector;
mod config;
mod http;
mod metrics;
mod parsers;
mod poller;
mod session;
mod state;

use axum::serve;
use clap::Parser;
use collector::CollectorSettings;
use config::Config;
use metrics::Metrics;
use poller::{Poller, SnapshotStore};
use session::SshSessionFactory;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fleetmond")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if !Path::new(&cfg.ssh_key_path).exists() {
        error!(path = %cfg.ssh_key_path, "ssh key file not found");
        std::process::exit(1);
    }

    info!(
        listen = %cfg.listen,
        interval_secs = cfg.interval_secs,
        servers = cfg.servers.len(),
        "starting fleetmond"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };
    let store = SnapshotStore::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        let store = store.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, store, cfg.interval_secs);
            let addr: SocketAddr = match cfg.listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %cfg.listen, "invalid listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start the HTTP server");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    let poller_task = {
        let factory = SshSessionFactory::new(PathBuf::from(&cfg.ssh_key_path));
        let settings = CollectorSettings {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            command_timeout: Duration::from_secs(cfg.command_timeout_secs),
        };
        let poller = Poller::new(
            factory,
            cfg.servers.clone(),
            settings,
            Duration::from_secs(cfg.interval_secs),
            store.clone(),
            metrics.clone(),
        );
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            poller.run(shutdown).await;
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("received Ctrl+C, shutting down");

    let _ = shutdown_tx.send(true);

    let _ = poller_task.await;
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
