use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobgate",
    about = "Blobgate: per-user file storage over HTTP, backed by object storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP gateway
    Serve(ServeArgs),
    /// Print the effective configuration with secrets masked
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Listen address, overriding the file and environment
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
