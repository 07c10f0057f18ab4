use anyhow::Context;
use blobgate_server::{GatewayConfig, GatewayServer};
use colored::Colorize;

use crate::cli::{Cli, Command, ConfigArgs, ServeArgs};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Config(args) => cmd_config(args),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config =
        GatewayConfig::load(args.config.as_deref()).context("invalid configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        let server = GatewayServer::new(config)?;
        println!(
            "{} Blobgate on {} (bucket: {})",
            "✓".green().bold(),
            server.config().bind_addr.to_string().bold(),
            server.config().storage.bucket.yellow()
        );
        server.serve().await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = GatewayConfig::load(args.config.as_deref()).context("invalid configuration")?;
    let rendered = toml::to_string_pretty(&config.redacted())?;
    let source = args
        .config
        .as_deref()
        .map_or_else(|| "defaults + environment".to_owned(), |p| p.display().to_string());
    println!("{} {}", "#".dimmed(), source.dimmed());
    print!("{rendered}");
    Ok(())
}
