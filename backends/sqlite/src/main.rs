use anyhow::Result;
use clap::Parser;
use habitat_sqlite::{cli::Cli, commands, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    let level = if cfg.logging_enabled { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();
    commands::run(cli.command, &cfg).await
}
