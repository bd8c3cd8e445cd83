//! Stage wiring.
//!
//! [`Pipeline`] builds the Source → Matcher → Clusterer → Extractor chain
//! and hands the clusterer a writer handle to the source's replay queue,
//! closing the feedback loop.

use anyhow::Result;
use serde::Serialize;

use crate::cluster::{ClusterOptions, Clusterer};
use crate::embedding::Embedder;
use crate::extract::{Extractor, TemplateOracle};
use crate::matcher::Matcher;
use crate::models::MatchedRecord;
use crate::source::LineSource;
use crate::template::Template;

/// Snapshot of counters across all stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub lines_read: u64,
    pub lines_replayed: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub flushes: u64,
    pub communities: u64,
    pub sample_groups: u64,
    pub learned: u64,
    pub inference_failures: u64,
    pub recycled: u64,
    pub unexplained: u64,
}

/// The full streaming pipeline.
pub struct Pipeline<E, O> {
    extractor: Extractor<E, O>,
}

impl<E: Embedder, O: TemplateOracle> Pipeline<E, O> {
    /// Assemble a pipeline over `source`, seeded with `templates`.
    pub fn new(
        source: LineSource,
        templates: Vec<Template>,
        embedder: E,
        oracle: O,
        options: ClusterOptions,
    ) -> Self {
        let replay = source.replay_queue();
        let matcher = Matcher::new(source, templates);
        let clusterer = Clusterer::new(matcher, embedder, replay, options);
        Self {
            extractor: Extractor::new(clusterer, oracle),
        }
    }

    /// Pull the next matched record.
    pub async fn next_record(&mut self) -> Result<Option<MatchedRecord>> {
        self.extractor.next_record().await
    }

    /// Templates in priority order, seeded ones first.
    pub fn templates(&self) -> &[Template] {
        self.extractor.clusterer().matcher().templates()
    }

    pub fn stats(&self) -> PipelineStats {
        let clusterer = self.extractor.clusterer();
        let matcher = clusterer.matcher();
        let cluster = clusterer.stats();
        let extract = self.extractor.stats();
        PipelineStats {
            lines_read: matcher.source().lines_read(),
            lines_replayed: matcher.source().lines_replayed(),
            matched: matcher.matched(),
            unmatched: matcher.unmatched(),
            flushes: cluster.flushes,
            communities: cluster.communities,
            sample_groups: cluster.sample_groups,
            learned: extract.learned,
            inference_failures: extract.failures,
            recycled: cluster.recycled,
            unexplained: cluster.unexplained,
        }
    }

    /// Consume the pipeline, returning every template it knows.
    pub fn into_templates(self) -> Vec<Template> {
        self.extractor.into_clusterer().into_matcher().into_templates()
    }
}
