//! `shutdown <addr>` — issues the `shutdown` RPC at a running provider (§6).
//!
//! The RDMA/RPC transport is out of scope; this binary talks to whatever
//! [`bake_backend::Fabric`] is linked in. The only concrete
//! fabric this repository ships is [`bake_provider::loopback::LoopbackFabric`],
//! a same-process stand-in, so `shutdown` built from this crate can only
//! reach a provider registered in its own process — exercised by the
//! integration test in `bake_cli::client`, not by running this binary
//! against a separate `server-daemon` process. A deployment that links a
//! real Mercury/libfabric-backed `Fabric` in place of the loopback one
//! would let this binary reach a daemon over the network unchanged.

use bake_cli::BakeClient;
use bake_common::format_error;
use bake_provider::loopback::LoopbackFabric;
use clap::Parser;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "shutdown", about = "Shut down a BAKE storage provider")]
struct Args {
    addr: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let fabric = LoopbackFabric::new();
    let result = async {
        let client = BakeClient::connect(fabric, &args.addr).await?;
        client.shutdown().await
    }
    .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", format_error("shutdown", &err));
            ExitCode::FAILURE
        }
    }
}
