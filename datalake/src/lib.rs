pub mod models;
pub mod processor;
pub mod reader;
pub mod schema;
pub mod storage;
pub mod writer;

use common::Result;
use common::config::Settings;
use processor::{LakeProcessor, RunSummary};

/// Runs catalog processing, then event processing, against `settings`.
pub async fn run_pipeline(settings: &Settings) -> Result<RunSummary> {
    let processor = LakeProcessor::new(settings)?;
    processor.run().await
}

/// Loads settings from `config_path` (plus `APP_` environment overrides) and runs the pipeline.
pub async fn run_etl_pipeline(config_path: &str) -> Result<RunSummary> {
    let settings = Settings::new(config_path)?;
    run_pipeline(&settings).await
}
