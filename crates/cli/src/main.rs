//! rtpmix: rebuild a two-party call recording from a packet trace

mod logging;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use logging::setup_logging;
use rtpmix_core::{MergePipeline, StatusEvent};
use settings::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.logging_config()?)?;

    info!("Starting rtpmix v{}", env!("CARGO_PKG_VERSION"));

    let config = args.merge_config()?;
    let pipeline = MergePipeline::new(config).context("Invalid configuration")?;

    let mut events = pipeline.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StatusEvent::TraceFinished { .. }) | Err(RecvError::Closed) => break,
                Ok(event) => info!("{}", event),
                Err(RecvError::Lagged(n)) => info!("Missed {} status events", n),
            }
        }
    });

    let started = Instant::now();
    let result = pipeline.run_files().await;

    // Closes the status channel if the run ended before announcing it
    drop(pipeline);
    let _ = reporter.await;

    let stats = result.context("Merge failed")?;
    info!("Merge finished in {:?}", started.elapsed());
    println!("{}", stats);
    Ok(())
}
