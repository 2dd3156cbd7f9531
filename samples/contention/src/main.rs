//! Contention harness entry point.

use anyhow::Context;
use clap::Parser;
use contention::config::ContentionConfig;
use contention::scenario;
use fibrous::effect::async_io::runtime;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,contention=debug,fibrous=info".into()),
        )
        .with(fmt::layer())
        .init();

    let config = ContentionConfig::parse()
        .validate()
        .context("invalid configuration")?;
    tracing::info!(?config, "starting contention harness");

    let reports = runtime::try_run_blocking(scenario::run(&config))
        .context("failed to enter the runtime")?
        .context("scenario failed")?;

    for report in &reports {
        println!("{report}");
    }
    Ok(())
}
