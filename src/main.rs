#![warn(clippy::all)]

mod blocklist;
mod cache;
mod error;
mod handler;
mod request;
mod response;
mod route;
mod state;
mod stats;
mod upstream;

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::{lookup_host, TcpListener};
use tracing::{debug, error, info};

use crate::handler::{handle_connection, ProxyConfig};
use crate::state::ProxyState;
use crate::stats::Stats;

// ============================================================================
// CLI ARGUMENTS
// ============================================================================

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(short = 'a', long, default_value = "localhost")]
    address: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = 2100)]
    port: u16,

    /// Start with caching enabled
    #[arg(long)]
    cache: bool,

    /// Start with domain blocking enabled
    #[arg(long)]
    block: bool,

    /// File with one blocked host per line
    #[arg(long)]
    blocklist: Option<PathBuf>,

    /// Upstream connect timeout in seconds, 0 disables it
    #[arg(long, default_value_t = 0)]
    timeout_connect: u64,

    #[arg(long, default_value_t = 60)]
    stats_interval: u64,

    #[arg(long, short = 'q')]
    quiet: bool,

    #[arg(long, short = 'v')]
    verbose: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get() * 2)
        .enable_all()
        .build()?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let blocked = match args.blocklist {
        Some(ref path) => blocklist::load(path)?,
        None => Vec::new(),
    };

    let state = Arc::new(ProxyState::new(args.cache, args.block, blocked));
    let stats = Arc::new(Stats::new());

    if args.stats_interval > 0 {
        let stats = stats.clone();
        let state = state.clone();
        let interval = args.stats_interval;
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(Duration::from_secs(interval));
            // First tick fires immediately.
            timer.tick().await;
            loop {
                timer.tick().await;
                stats.print(&state);
            }
        });
    }

    let listener = bind(&args.address, args.port).await?;

    info!(
        "Proxy listening on http://{} (cache={}, blocklist={}, {} blocked hosts)",
        listener.local_addr()?,
        state.cache_enabled(),
        state.block_enabled(),
        state.blocked_count(),
    );

    let connect_timeout = if args.timeout_connect > 0 {
        Some(Duration::from_secs(args.timeout_connect))
    } else {
        None
    };

    let config = ProxyConfig {
        state,
        stats,
        connect_timeout,
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
            res = listener.accept() => {
                let (client_stream, client_addr) = match res {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        continue;
                    }
                };

                let config = config.clone();
                Stats::incr(&config.stats.total);
                Stats::incr(&config.stats.active);

                tokio::spawn(async move {
                    let _ = client_stream.set_nodelay(true);
                    let stats = config.stats.clone();
                    if let Err(e) = handle_connection(client_stream, client_addr, config).await {
                        debug!("Connection error from {}: {}", client_addr, e);
                        Stats::incr(&stats.failed);
                    }
                    stats.active.fetch_sub(1, Ordering::Relaxed);
                });
            }
        }
    }
}

async fn bind(address: &str, port: u16) -> anyhow::Result<TcpListener> {
    use socket2::{Domain, Protocol, Socket, Type};

    let addr: SocketAddr = lookup_host((address, port))
        .await
        .with_context(|| format!("Failed to resolve {}:{}", address, port))?
        .next()
        .with_context(|| format!("No address for {}:{}", address, port))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    match socket.bind(&addr.into()) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            anyhow::bail!("Port {} already in use on {}", port, addr.ip());
        }
        Err(e) => return Err(e).with_context(|| format!("Bind failed on {}", addr)),
    }

    socket.listen(1024)?;
    Ok(TcpListener::from_std(socket.into())?)
}
