use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "radarloop",
    version,
    about = "Cycle radar frames from a polled listing endpoint"
)]
pub struct Cli {
    /// Read settings from this file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the listing endpoint URL
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the interactive viewer (default)
    Watch,
    /// Fetch the listing once and print a summary
    Listing,
    /// Print the effective configuration
    Config,
}
