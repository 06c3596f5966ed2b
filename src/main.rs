use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use mcmarkdup::{Args, run_markdup};

#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    run_markdup(&args)?;
    Ok(())
}
