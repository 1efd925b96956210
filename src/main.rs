mod app;
mod cli;
mod config;
mod http;
mod logging;
mod paths;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let _log_guard = logging::init()?;
    app::run(cli)
}
