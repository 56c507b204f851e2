use clap::Parser;
use skinscan::cli::Cli;
use skinscan::config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::get_configuration().expect("failed to load config");
    let log_level = &format!("{},hyper=info", config.log_level.as_str());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .init();

    skinscan::start_app(config, cli.command).await?;

    Ok(())
}
