use anyhow::Result;
use clap::Parser;
use leavebook::cli::Cli;
use leavebook::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.apply_overrides(Config::from_env()?)?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    cli.run(config).await
}
