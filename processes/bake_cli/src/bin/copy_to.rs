//! `copy-to <file> <addr> <provider-id> <target-n>` — eagerly writes a local
//! file into the `target-n`'th target a provider reports via `probe` (§6).
//!
//! On success prints one line: `<target_id> <region_id> <size>`, the format
//! `copy-from` expects in its rid-file argument. The original's CLI table
//! doesn't fix a wire format for this handoff since it's a local convenience
//! around the two RPCs, not part of the provider protocol itself.

use bake_cli::BakeClient;
use bake_provider::loopback::LoopbackFabric;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "copy-to", about = "Copy a local file into a BAKE target")]
struct Args {
    file: PathBuf,
    addr: String,
    provider_id: u16,
    target_n: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let result = run(&args).await;
    match result {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("copy-to: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<String> {
    let addr = peer_addr(&args.addr, args.provider_id);
    let fabric = LoopbackFabric::new();
    let client = BakeClient::connect(fabric, &addr).await?;

    let targets = client.probe_all().await?;
    let target_id = *targets
        .get(args.target_n)
        .ok_or_else(|| anyhow::anyhow!("provider reports only {} target(s)", targets.len()))?;

    let bytes = std::fs::read(&args.file)?;
    let size = bytes.len() as u64;
    let region_id = client.eager_create_write_persist(target_id, bytes).await?;

    Ok(format!("{target_id} {} {size}", region_id.to_string_form()))
}

/// `<addr>#<provider-id>` mirrors the `server-daemon`'s own
/// `MultiplexMode::Providers` addressing scheme; provider id 0 is the
/// default single-provider daemon and is addressed bare.
fn peer_addr(addr: &str, provider_id: u16) -> String {
    if provider_id == 0 {
        addr.to_string()
    } else {
        format!("{addr}#{provider_id}")
    }
}
