//! Standalone entry point for the optional pass-through proxy variant
//! (spec §4.9). Distinct from the main `syncplay-server` binary: the
//! original ships this as a separate process too
//! (`examples/original_source/syncplay/proxy.py` / `ep_proxy.py`), one
//! `host:port` upstream, optionally fronted by its own TLS certificate on
//! the TCP listener and/or a WebSocket listener.

use std::sync::Arc;

use clap::Parser;
use syncplay_server::config::LoggingConfig;
use syncplay_server::connection::bind_dual_stack;
use syncplay_server::logging;
use syncplay_server::proxy::{tcp, ws, ProxyConfig};
use syncplay_server::security::TlsContext;

/// Pass-through front-end that forwards Syncplay wire frames to an
/// upstream core server without interpreting them.
#[derive(Parser, Debug)]
#[command(name = "syncplay-proxy")]
#[command(about = "Pass-through proxy front-end for a Syncplay-compatible server")]
#[command(version)]
struct Cli {
    /// TCP port to listen on for plain/TLS clients. Omit to disable the
    /// TCP front-end entirely.
    #[arg(long, env = "SYNCPLAY_TCP_PORT")]
    tcp_port: Option<u16>,

    /// Port to listen on for WebSocket clients. Omit to disable the
    /// WebSocket front-end entirely.
    #[arg(long, env = "SYNCPLAY_WS_PORT")]
    ws_port: Option<u16>,

    /// Upstream core server, as `host:port`.
    #[arg(long, env = "SYNCPLAY_HOST", default_value = "syncplay.pl:8997")]
    host: String,

    /// Directory holding `privkey.pem` + `fullchain.pem`/`cert.pem` for the
    /// TCP front-end's own in-band TLS upgrade. Has no effect on the
    /// WebSocket front-end, which never performs an in-band upgrade.
    #[arg(long, env = "SYNCPLAY_TLS_PATH")]
    tls_path: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_with_config(&LoggingConfig::default());

    if cli.tcp_port.is_none() && cli.ws_port.is_none() {
        anyhow::bail!("no front-end configured: pass --tcp-port and/or --ws-port");
    }

    let (upstream_host, upstream_port) = cli
        .host
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("--host must be formatted as host:port"))?;
    let upstream_port: u16 = upstream_port
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid upstream port in --host"))?;

    let mut cfg = ProxyConfig::new(upstream_host, upstream_port);
    if let Some(dir) = &cli.tls_path {
        match TlsContext::load(dir) {
            Ok(ctx) => {
                tracing::info!(dir, "proxy: TLS support enabled");
                cfg = cfg.with_tls(Arc::new(ctx));
            }
            Err(error) => {
                tracing::error!(
                    %error,
                    dir,
                    "proxy: failed to load TLS certificate; continuing without it"
                );
            }
        }
    }
    let cfg = Arc::new(cfg);

    let mut tasks = Vec::new();

    if let Some(port) = cli.tcp_port {
        let listeners = bind_dual_stack(port).await?;
        tracing::info!(port, listener_count = listeners.len(), "proxy: TCP front-end listening");
        for listener in listeners {
            let cfg = cfg.clone();
            tasks.push(tokio::spawn(tcp::serve(listener, cfg)));
        }
    }

    if let Some(port) = cli.ws_port {
        let listeners = bind_dual_stack(port).await?;
        tracing::info!(port, listener_count = listeners.len(), "proxy: WebSocket front-end listening");
        for listener in listeners {
            let cfg = cfg.clone();
            tasks.push(tokio::spawn(ws::serve(listener, cfg)));
        }
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
