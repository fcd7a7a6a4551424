//! Binary entry point: CLI flags, config loading, logging setup, and wiring
//! the Block Cache, Ingestor, Mempool Tracker, and Range/Query Service into
//! a running tonic server (spec.md §6 Process surface).

mod config;
mod logging;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lwd_cache::BlockCache;
use lwd_ingest::{CancelToken, Ingestor, MempoolTracker};
use lwd_rpc::retry::retry_startup;
use lwd_rpc::{Chain, HttpChain};
use lwd_service::{BuildInfo, CompactTxStreamerServer, Service};
use tracing::{error, info, warn};

use config::ServerConfig;

#[derive(Parser)]
#[command(name = "lwd-server")]
#[command(about = "Light-wallet backend: block cache, ingestor, mempool tracker, and range streamer")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "lwd-server.toml")]
    config: PathBuf,

    /// Override the gRPC bind address from the config file.
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Override the data directory from the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Disable on-disk persistence; every range request falls through to upstream.
    #[arg(long)]
    no_cache: bool,

    /// Block startup until the cache has caught up to the upstream tip.
    #[arg(long)]
    wait_for_tip: bool,

    /// Override the log level (otherwise the config file, then `RUST_LOG`, then `info`).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lwd-server: fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = ServerConfig::from_file(&cli.config)?;
    if let Some(addr) = cli.bind_addr {
        cfg.bind_addr = addr;
    }
    if let Some(dir) = cli.data_dir {
        cfg.data_dir = dir;
    }
    if cli.no_cache {
        cfg.no_cache = true;
    }
    if cli.wait_for_tip {
        cfg.wait_for_tip = true;
    }
    if let Some(level) = cli.log_level {
        cfg.log.level = Some(level);
    }

    logging::init(&cfg.log);
    info!(
        event = "startup",
        bind_addr = %cfg.bind_addr,
        chain = %cfg.chain_name,
        no_cache = cfg.no_cache,
        wait_for_tip = cfg.wait_for_tip,
        "starting lwd-server"
    );

    let chain: Arc<dyn Chain> = Arc::new(HttpChain::new(
        cfg.rpc_url_with_credentials(),
        Duration::from_secs(30),
    )?);

    // Startup handshake (SPEC_FULL.md §4 "Upstream version handshake" /
    // spec.md §9 Open Question): one retried getblockchaininfo and getinfo
    // call, so a node that's still starting up doesn't fail the process
    // outright. The probed `subversion` is logged for operators; no
    // behavioral branch in this upstream lineage currently depends on it.
    let chain_startup = chain.clone();
    let info = retry_startup("getblockchaininfo", || chain_startup.get_blockchain_info()).await?;
    let chain_startup = chain.clone();
    let build = retry_startup("getinfo", || chain_startup.get_info()).await?;
    info!(
        event = "upstream_handshake",
        chain = %info.chain,
        blocks = info.blocks,
        subversion = %build.subversion,
        "connected to upstream node"
    );

    let cache = if cfg.no_cache {
        None
    } else {
        Some(BlockCache::open(
            &cfg.data_dir,
            &cfg.chain_name,
            cfg.first_block,
            None,
        )?)
    };

    let stop = CancelToken::new();
    let mempool = Arc::new(MempoolTracker::new(chain.clone()));

    let ingestor_handle = cache.clone().map(|cache| {
        let chain = chain.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut ingestor = Ingestor::new(chain, cache, stop);
            if let Err(e) = ingestor.run(None).await {
                error!(event = "ingestor_fatal", error = %e, "ingestor terminated, exiting");
                std::process::exit(1);
            }
        })
    });

    if cfg.wait_for_tip {
        match &cache {
            Some(cache) => wait_for_tip(cache, &chain, &stop).await?,
            None => warn!(
                event = "wait_for_tip_skipped",
                "no_cache is set; wait_for_tip has nothing to wait for"
            ),
        }
    }

    let build_info = BuildInfo {
        chain_name: cfg.chain_name.clone(),
        sapling_activation_height: cfg.sapling_activation_height,
        git_commit: std::env::var("LWD_GIT_COMMIT").unwrap_or_default(),
        branch: std::env::var("LWD_GIT_BRANCH").unwrap_or_default(),
        build_date: std::env::var("LWD_BUILD_DATE").unwrap_or_default(),
        build_user: std::env::var("LWD_BUILD_USER").unwrap_or_default(),
    };

    let service = Service::new(cache, chain.clone(), mempool, build_info);
    let server = CompactTxStreamerServer::new(service);

    let shutdown_stop = stop.clone();
    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "shutdown_signal", "received ctrl-c, shutting down");
        shutdown_stop.cancel();
    };

    info!(event = "serving", addr = %cfg.bind_addr, "gRPC server listening");
    tonic::transport::Server::builder()
        .add_service(server)
        .serve_with_shutdown(cfg.bind_addr, shutdown_signal)
        .await?;

    stop.cancel();
    if let Some(handle) = ingestor_handle {
        let _ = handle.await;
    }

    info!(event = "shutdown_complete", "lwd-server exiting");
    Ok(())
}

/// Polls the cache against the upstream tip until it has caught up, or
/// until `stop` is signalled (e.g. by a shutdown request during startup).
async fn wait_for_tip(
    cache: &BlockCache,
    chain: &Arc<dyn Chain>,
    stop: &CancelToken,
) -> anyhow::Result<()> {
    loop {
        if stop.is_cancelled() {
            return Ok(());
        }
        let info = chain.get_blockchain_info().await?;
        let height = cache.latest_height();
        if height >= 0 && height as u64 + 1 >= info.blocks {
            info!(
                event = "tip_reached",
                height,
                upstream = info.blocks,
                "cache caught up to upstream tip"
            );
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}
