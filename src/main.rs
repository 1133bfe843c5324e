use coalescer::{
    config::Config,
    demo::{self, DemoReport},
    Batcher,
};
use serde_json::json;
use tracing::info;

/// The main entry point for the coalescer demonstration.
///
/// Initializes logging, loads the configuration (first argument, or
/// `config/default.toml`), registers the demonstration resolvers and drives
/// every composition to completion on a single-threaded runtime.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = Config::load_or_default(&path)?;
    info!("Coalescer starting with config: {:?}", config);

    let batcher = Batcher::new(config.batch.clone());
    let loaders = demo::register(&batcher, &config.demo)?;

    let report = demo::run_root(&loaders).await?;
    anyhow::ensure!(
        report == DemoReport::expected(),
        "unexpected demonstration results: {:?}",
        report
    );

    let stats = batcher.stats();
    info!(
        "Completed in {} rounds with {} resolver invocations",
        stats.rounds, stats.invocations
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "report": report, "stats": stats }))?
    );

    Ok(())
}
