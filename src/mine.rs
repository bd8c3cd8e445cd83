//! The `run` command.
//!
//! Opens the pattern memory session for the inputs, seeds the pipeline
//! with the remembered templates, stores every matched record in the field
//! store and writes the grown template list back to memory.

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use logmine_core::embedding::Embedder;
use logmine_core::pipeline::{Pipeline, PipelineStats};
use logmine_core::source::LineSource;

use crate::config::Config;
use crate::db;
use crate::embedding::ProviderEmbedder;
use crate::inference::create_oracle;
use crate::inputs::{expand_inputs, open_inputs, source_key};
use crate::memory::PatternMemory;
use crate::migrate::migrate_pool;
use crate::progress::RunProgressReporter;
use crate::store::{collect, FieldStore};

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub inputs: usize,
    pub stored: u64,
    pub templates_seeded: usize,
    pub templates_total: usize,
    #[serde(flatten)]
    pub stats: PipelineStats,
}

impl RunSummary {
    pub fn print(&self) {
        println!("Run complete: {}", self.source);
        println!("  inputs:              {}", self.inputs);
        println!("  lines read:          {}", self.stats.lines_read);
        println!("  lines matched:       {}", self.stats.matched);
        println!("  records stored:      {}", self.stored);
        println!("  flushes:             {}", self.stats.flushes);
        println!(
            "  templates learned:   {} ({} known)",
            self.stats.learned, self.templates_total
        );
        println!("  inference failures:  {}", self.stats.inference_failures);
        println!("  lines recycled:      {}", self.stats.recycled);
        println!("  lines unmatched:     {}", self.stats.unexplained);
    }
}

/// Mine `args` into the field store.
pub async fn run_mine(
    config: &Config,
    args: &[String],
    progress: &dyn RunProgressReporter,
) -> Result<RunSummary> {
    let inputs = expand_inputs(args)?;
    let readers = open_inputs(&inputs)?;
    let key = source_key(args);

    let embedder = ProviderEmbedder::new(&config.embedding)?;
    if !embedder.is_enabled() {
        warn!("embedding disabled: only remembered templates will be matched");
    }
    if embedder.is_enabled() && !config.inference.is_enabled() {
        warn!("inference disabled: no new templates will be learned");
    }
    let oracle = create_oracle(&config.inference)?;
    let options = config.cluster.options()?;

    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let mut store = FieldStore::new(pool.clone());

    let mut session = PatternMemory::open(&config.memory.path, &key)?;
    let seeded = session.load_patterns()?;
    info!(
        source = %key,
        inputs = inputs.len(),
        templates = seeded.len(),
        "starting run"
    );
    let templates_seeded = seeded.len();

    let source = LineSource::new(readers, config.input.max_line_len);
    let mut pipeline = Pipeline::new(source, seeded, embedder, oracle, options);

    let stored = collect(
        &mut pipeline,
        &mut store,
        config.output.max_records,
        progress,
    )
    .await?;

    let stats = pipeline.stats();
    let templates = pipeline.into_templates();
    let templates_total = templates.len();
    session.store_patterns(templates);
    session.close()?;
    pool.close().await;

    info!(stored, learned = stats.learned, "run finished");

    Ok(RunSummary {
        source: key,
        inputs: inputs.len(),
        stored,
        templates_seeded,
        templates_total,
        stats,
    })
}
