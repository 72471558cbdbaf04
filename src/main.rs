#![cfg_attr(not(test), deny(clippy::panic))]

use std::sync::Arc;

use clap::Parser;
use syncplay_server::config::{self, ServerConfig};
use syncplay_server::connection;
use syncplay_server::logging;
use syncplay_server::room::RoomManager;
use syncplay_server::security::TlsContext;

/// Syncplay-compatible room synchronization server.
#[derive(Parser, Debug)]
#[command(name = "syncplay-server")]
#[command(about = "Room synchronization server speaking Syncplay's line-delimited JSON protocol")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config_security(&cfg);
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Password protected: {}", cfg.server.password.is_some());
                println!("  Isolate rooms: {}", cfg.server.isolate_rooms);
                println!("  Chat disabled: {}", cfg.server.disable_chat);
                println!("  Readiness disabled: {}", cfg.server.disable_ready);
                println!("  TLS configured: {}", cfg.tls.cert_path.is_some());
                println!("  Stats DB: {}", cfg.server.stats_db_file.as_deref().unwrap_or("(disabled)"));
                return Ok(());
            }
            Err(error) => {
                eprintln!("Configuration validation failed:\n{error}");
                std::process::exit(1);
            }
        }
    }
    validation_result?;

    logging::init_with_config(&cfg.logging);

    let salt = cfg.server.salt.clone().unwrap_or_else(syncplay_server::security::generate_salt);
    let port = cfg.port;
    let server_config = Arc::new(cfg.server.clone());
    let stats_db_file = cfg.server.stats_db_file.clone();

    let tls: Option<Arc<TlsContext>> = match &cfg.tls.cert_path {
        Some(dir) => match TlsContext::load(dir) {
            Ok(ctx) => {
                tracing::info!(dir, "TLS enabled");
                Some(Arc::new(ctx))
            }
            Err(error) => {
                tracing::error!(%error, dir, "failed to load TLS certificate; continuing without TLS");
                None
            }
        },
        None => None,
    };

    let manager = RoomManager::spawn(server_config.clone(), salt);

    #[cfg(feature = "stats")]
    if let Some(path) = &stats_db_file {
        match syncplay_server::stats::open(path) {
            Ok(conn) => syncplay_server::stats::spawn(conn, manager.clone()),
            Err(error) => tracing::error!(%error, path, "failed to open stats database"),
        }
    }
    #[cfg(not(feature = "stats"))]
    let _ = stats_db_file;

    let listeners = connection::bind_dual_stack(port).await?;
    tracing::info!(port, listener_count = listeners.len(), "syncplay-server listening");

    for listener in listeners {
        let manager = manager.clone();
        let tls = tls.clone();
        tokio::spawn(connection::serve(listener, manager, tls));
    }

    wait_for_shutdown().await;
    tracing::info!("shutdown signal received, exiting");
    Ok(())
}

async fn wait_for_shutdown() {
    use tokio::signal;

    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sigterm) = signal::unix::signal(signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            return;
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
