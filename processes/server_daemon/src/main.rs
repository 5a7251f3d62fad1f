//! `server-daemon` — starts a provider (or a fleet of providers, under
//! `-m providers`) bound to one or more pools (§6).
//!
//! The RDMA/RPC transport that would let this process accept connections
//! from a remote host is explicitly out of scope. What is implemented here
//! is everything the daemon does around that transport:
//! argument parsing, layered JSON/environment configuration, multiplex-mode
//! provider construction, target attachment, and an orderly shutdown wait.
//! In place of a real listener, providers are registered on a
//! [`bake_provider::loopback::LoopbackFabric`] — the same stand-in the
//! integration tests use — so this binary is runnable and demonstrates the
//! full startup path, but only reachable from within this same process
//! (e.g. embedding it in a larger test harness) until a real transport is
//! wired in.

mod config;

use anyhow::{bail, Context, Result};
use bake_backend::Backend;
use bake_file_backend::FileBackend;
use bake_pmem_backend::PmemBackend;
use bake_provider::loopback::LoopbackFabric;
use bake_provider::BakeProvider;
use bake_transfer::BufferPool;
use clap::Parser;
use config::{DaemonConfig, MultiplexMode};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "server-daemon", about = "BAKE storage-provider daemon")]
struct Args {
    /// Mercury address to listen on.
    #[arg(short = 'l', long = "listen")]
    listen_addr: Option<String>,

    /// Write the server's listen address to this file once bound.
    #[arg(short = 'f', long = "host-file")]
    host_file: Option<String>,

    /// Multiplexing mode for managing multiple pools: "targets" (one
    /// provider, many targets) or "providers" (one provider per pool).
    #[arg(short = 'm', long = "multiplex")]
    multiplex: Option<String>,

    /// Enable pipelined bulk transfers.
    #[arg(short = 'p', long = "pipeline")]
    pipeline: bool,

    /// JSON configuration file; command-line flags override its values.
    #[arg(short = 'j', long = "config")]
    config: Option<String>,

    /// Pool paths, each optionally prefixed `pmem:` or `file:` to select
    /// the backend (defaults to `pmem:` when no prefix is given).
    #[arg(required = true)]
    pools: Vec<String>,
}

enum PoolSpec {
    Pmem(std::path::PathBuf),
    File(std::path::PathBuf),
}

fn parse_pool_spec(raw: &str) -> PoolSpec {
    if let Some(path) = raw.strip_prefix("pmem:") {
        PoolSpec::Pmem(Path::new(path).to_path_buf())
    } else if let Some(path) = raw.strip_prefix("file:") {
        PoolSpec::File(Path::new(path).to_path_buf())
    } else {
        PoolSpec::Pmem(Path::new(raw).to_path_buf())
    }
}

fn open_backend(
    spec: &PoolSpec,
    pool: Arc<BufferPool>,
    target_concurrency: usize,
) -> Result<(bake_common::TargetId, Arc<dyn Backend>)> {
    match spec {
        PoolSpec::Pmem(path) => {
            let backend = PmemBackend::open(path)
                .with_context(|| format!("opening pmem pool {}", path.display()))?;
            let target_id = backend.target_id();
            Ok((target_id, Arc::new(backend)))
        }
        PoolSpec::File(path) => {
            let backend = FileBackend::open(path, pool, target_concurrency)
                .with_context(|| format!("opening file pool {}", path.display()))?;
            let target_id = backend.target_id();
            Ok((target_id, Arc::new(backend)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let multiplex = args
        .multiplex
        .as_deref()
        .map(MultiplexMode::parse)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let cfg = DaemonConfig::resolve(
        args.config.as_deref(),
        args.listen_addr.as_deref(),
        args.host_file.as_deref(),
        multiplex,
        args.pipeline,
    )?;

    if args.pools.is_empty() {
        bail!("at least one pool must be given");
    }

    let fabric = LoopbackFabric::new();
    let buffer_pool = BufferPool::new(
        cfg.effective_buffer_pool_capacity(),
        cfg.provider.buffer_pool_chunk_size,
        cfg.provider.block_size as u64,
    );
    let listen_addr = cfg.provider.bind_addr.clone();

    let mut providers = Vec::new();
    match cfg.multiplex_mode {
        MultiplexMode::Targets => {
            let provider = BakeProvider::with_config(1, fabric.clone(), cfg.provider.clone());
            for raw in &args.pools {
                let spec = parse_pool_spec(raw);
                let (target_id, backend) =
                    open_backend(&spec, buffer_pool.clone(), cfg.provider.target_concurrency)?;
                tracing::info!(provider = 1, backend = backend.name(), pool = raw.as_str(), "attaching target");
                provider.attach_target(target_id, backend);
            }
            fabric.register_provider(&listen_addr, provider.clone());
            providers.push(provider);
        }
        MultiplexMode::Providers => {
            for (i, raw) in args.pools.iter().enumerate() {
                let provider_id = (i + 1) as u16;
                let provider =
                    BakeProvider::with_config(provider_id, fabric.clone(), cfg.provider.clone());
                let spec = parse_pool_spec(raw);
                let (target_id, backend) =
                    open_backend(&spec, buffer_pool.clone(), cfg.provider.target_concurrency)?;
                provider.attach_target(target_id, backend);
                let addr = format!("{listen_addr}#{provider_id}");
                fabric.register_provider(&addr, provider.clone());
                tracing::info!(provider = provider_id, addr = addr.as_str(), pool = raw.as_str(), "provider listening");
                providers.push(provider);
            }
        }
    }

    if let Some(host_file) = &cfg.host_file {
        std::fs::write(host_file, &listen_addr)
            .with_context(|| format!("writing host file {host_file}"))?;
    }

    println!(
        "bake server-daemon listening on {} ({} provider(s), pipeline={})",
        listen_addr,
        providers.len(),
        cfg.provider.pipeline_enabled
    );

    let shutdowns = providers.iter().map(|p| p.wait_for_shutdown());
    tokio::select! {
        _ = futures_wait_any(shutdowns) => {
            tracing::info!("received shutdown RPC, finalizing");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, finalizing");
        }
    }

    Ok(())
}

/// Resolves when any one of `futures` resolves. Providers each carry their
/// own `Notify`, so a shutdown RPC to one stops the whole daemon the same
/// way `margo_wait_for_finalize` stops the whole process.
async fn futures_wait_any<F: std::future::Future<Output = ()>>(futures: impl Iterator<Item = F>) {
    let futures: Vec<_> = futures.map(Box::pin).collect();
    if futures.is_empty() {
        std::future::pending::<()>().await;
    } else {
        futures::future::select_all(futures).await;
    }
}
