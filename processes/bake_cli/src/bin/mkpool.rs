//! `mkpool [-s size] [--backend pmem|file] [--block-size n] <path>` —
//! formats a pool (§6). Exits 0 and prints the freshly generated target id
//! on success; on failure prints a `bake_perror`-style message and exits
//! non-zero.

use bake_common::format_error;
use bake_file_backend::FileBackend;
use bake_pmem_backend::PmemBackend;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Default pmem pool size when `-s` is not given (64 MiB).
const DEFAULT_POOL_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "mkpool", about = "Format a BAKE storage pool")]
struct Args {
    /// Pool size in bytes. Only meaningful for the pmem backend; the file
    /// backend's log grows as regions are created.
    #[arg(short = 's', long = "size")]
    size: Option<u64>,

    /// Which backend's on-disk layout to format.
    #[arg(long = "backend", default_value = "pmem")]
    backend: String,

    /// Direct-I/O block alignment for the file backend's log. Ignored for
    /// the pmem backend.
    #[arg(long = "block-size")]
    block_size: Option<u64>,

    path: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let block_size = args
        .block_size
        .unwrap_or(bake_common::config::DEFAULT_BLOCK_SIZE as u64);
    let result = match args.backend.as_str() {
        "pmem" => PmemBackend::create_pool(&args.path, args.size.unwrap_or(DEFAULT_POOL_SIZE)),
        "file" => FileBackend::create_pool(&args.path, block_size),
        other => {
            eprintln!("mkpool (-2) unrecognized backend '{other}', expected 'pmem' or 'file'");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(target_id) => {
            println!("{target_id}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", format_error("mkpool", &err));
            ExitCode::FAILURE
        }
    }
}
