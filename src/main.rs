mod auth;
mod branch;
mod cli;
mod collector;
mod config;
mod error;
mod jenkins;
mod metrics;
mod poller;
mod watermark;

use cli::Cli;
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse_or_exit();
    info!("Starting FlowMetrix Exporter...");

    if let Err(e) = cli.execute().await {
        error!("{e:#}");
        std::process::exit(1);
    }
}
