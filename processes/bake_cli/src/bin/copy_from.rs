//! `copy-from <addr> <provider-id> <rid-file> <out-file>` — eagerly reads a
//! region named by a rid-file (the `<target_id> <region_id> <size>` line
//! `copy-to` prints) back out to a local file (§6).

use bake_cli::BakeClient;
use bake_common::{RegionId, TargetId};
use bake_provider::loopback::LoopbackFabric;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "copy-from", about = "Copy a BAKE region out to a local file")]
struct Args {
    addr: String,
    provider_id: u16,
    rid_file: PathBuf,
    out_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("copy-from: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let (target_id, region_id, size) = parse_rid_file(&args.rid_file)?;

    let addr = peer_addr(&args.addr, args.provider_id);
    let fabric = LoopbackFabric::new();
    let client = BakeClient::connect(fabric, &addr).await?;

    let bytes = client.eager_read(target_id, region_id, size).await?;
    std::fs::write(&args.out_file, bytes)?;
    Ok(())
}

fn parse_rid_file(path: &PathBuf) -> anyhow::Result<(TargetId, RegionId, u64)> {
    let contents = std::fs::read_to_string(path)?;
    let mut fields = contents.split_whitespace();
    let target_id = fields
        .next()
        .ok_or_else(|| anyhow::anyhow!("rid-file missing target id"))?;
    let region_id = fields
        .next()
        .ok_or_else(|| anyhow::anyhow!("rid-file missing region id"))?;
    let size = fields
        .next()
        .ok_or_else(|| anyhow::anyhow!("rid-file missing size"))?;

    let target_id = TargetId::from_str_form(target_id)
        .map_err(|e| anyhow::anyhow!("rid-file has an invalid target id: {e}"))?;
    let region_id = RegionId::from_str_form(region_id)
        .map_err(|e| anyhow::anyhow!("rid-file has an invalid region id: {e}"))?;
    let size: u64 = size
        .parse()
        .map_err(|e| anyhow::anyhow!("rid-file has an invalid size: {e}"))?;

    Ok((target_id, region_id, size))
}

fn peer_addr(addr: &str, provider_id: u16) -> String {
    if provider_id == 0 {
        addr.to_string()
    } else {
        format!("{addr}#{provider_id}")
    }
}
