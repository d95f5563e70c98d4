mod app;
mod config;

use anyhow::Result;
use clap::Parser;
use wgpu_bridge::logging::{init_logging, LoggingConfig};

use crate::config::HostArgs;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = HostArgs::parse().into_config()?;
    log::info!(
        "starting host: animation {}, job difficulty {}",
        config.animation,
        config.job.difficulty
    );

    app::run(config)
}
