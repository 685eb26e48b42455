use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod config;

use config::Config;

const DEFAULT_LOG_FILTER: &str = "info,kindle=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if flags.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = flags.resolve()?;
    app::run(config).await
}
