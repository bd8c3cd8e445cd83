//! Similarity clustering of unmatched lines.
//!
//! The [`Clusterer`] pulls classified items from the [`Matcher`]. Matched
//! records pass straight through. Unmatched lines are buffered until either
//! the buffer reaches its byte budget or a boundary marker arrives; then
//! the buffer is flushed:
//!
//! 1. embed every buffered line,
//! 2. detect similarity communities,
//! 3. draw a diverse sample from each of the largest communities and yield
//!    it downstream as [`Mined::Samples`],
//! 4. once downstream has consumed every sample, recycle the whole buffer
//!    into the line source's replay queue so the lines can match templates
//!    learned from those samples.
//!
//! Recycling only happens when at least one template was learned since the
//! flush; otherwise the lines would come back, form the same communities
//! and produce the same samples forever.

use std::collections::VecDeque;
use std::mem;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::community::{detect_communities, CommunityParams};
use crate::embedding::Embedder;
use crate::matcher::Matcher;
use crate::models::{Classified, Mined};
use crate::sample::{diverse_triple, SAMPLE_SIZE};
use crate::source::ReplayQueue;

/// Clustering configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    /// Bytes of unmatched lines to accumulate before a forced flush.
    pub buffer_size: usize,
    pub community: CommunityParams,
    /// Maximum number of communities sampled per flush.
    pub max_communities: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            buffer_size: 2 * 1024 * 1024,
            community: CommunityParams::default(),
            max_communities: 3,
        }
    }
}

/// Counters describing what the clusterer did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub flushes: u64,
    pub embedded_lines: u64,
    pub communities: u64,
    pub sample_groups: u64,
    pub embed_failures: u64,
    /// Lines handed back to the line source.
    pub recycled: u64,
    /// Lines dropped without a template to explain them.
    pub unexplained: u64,
}

/// Pull stage between the [`Matcher`] and template extraction.
pub struct Clusterer<E> {
    matcher: Matcher,
    embedder: E,
    replay: ReplayQueue,
    options: ClusterOptions,
    buffer: Vec<String>,
    size: usize,
    /// Byte size at which the next forced flush happens.
    watermark: usize,
    pending: VecDeque<Vec<String>>,
    /// Template count when the in-flight samples were produced.
    recycle_after: Option<usize>,
    stats: ClusterStats,
    finished: bool,
}

impl<E: Embedder> Clusterer<E> {
    pub fn new(matcher: Matcher, embedder: E, replay: ReplayQueue, options: ClusterOptions) -> Self {
        if !embedder.is_enabled() {
            info!("embedding disabled; unmatched lines will not be clustered");
        }
        let watermark = options.buffer_size;
        Self {
            matcher,
            embedder,
            replay,
            options,
            buffer: Vec::new(),
            size: 0,
            watermark,
            pending: VecDeque::new(),
            recycle_after: None,
            stats: ClusterStats::default(),
            finished: false,
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Mutable access for feeding learned templates back.
    pub fn matcher_mut(&mut self) -> &mut Matcher {
        &mut self.matcher
    }

    pub fn stats(&self) -> ClusterStats {
        self.stats
    }

    /// Lines currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_matcher(self) -> Matcher {
        self.matcher
    }

    /// Pull the next record or sample group. `Ok(None)` ends the stream.
    pub async fn next_item(&mut self) -> Result<Option<Mined>> {
        loop {
            if let Some(samples) = self.pending.pop_front() {
                return Ok(Some(Mined::Samples(samples)));
            }
            if let Some(count_at_flush) = self.recycle_after.take() {
                self.recycle(count_at_flush);
            }

            let item = match self.matcher.next() {
                Some(item) => item?,
                None => {
                    self.finish();
                    return Ok(None);
                }
            };

            let boundary = match item {
                Classified::Matched(record) => return Ok(Some(Mined::Record(record))),
                Classified::Unmatched(line) => {
                    if !self.embedder.is_enabled() {
                        self.stats.unexplained += 1;
                        continue;
                    }
                    self.size += line.len();
                    self.buffer.push(line);
                    false
                }
                Classified::Boundary => true,
            };

            if !boundary && self.size < self.watermark {
                continue;
            }
            if self.buffer.is_empty() {
                continue;
            }
            self.flush().await?;
        }
    }

    async fn flush(&mut self) -> Result<()> {
        self.stats.flushes += 1;

        if self.buffer.len() < SAMPLE_SIZE {
            debug!(lines = self.buffer.len(), "not enough unmatched lines to cluster");
            self.defer();
            return Ok(());
        }

        info!(
            "embedding {:.2}KB / {} logs, it might take a while",
            self.size as f64 / 1024.0,
            self.buffer.len()
        );
        let vectors = match self.embedder.embed(&self.buffer).await {
            Ok(v) => v,
            Err(e) => {
                warn!("embedding failed, keeping {} lines buffered: {:#}", self.buffer.len(), e);
                self.stats.embed_failures += 1;
                self.defer();
                return Ok(());
            }
        };
        if vectors.len() != self.buffer.len() {
            bail!(
                "embedder returned {} vectors for {} lines",
                vectors.len(),
                self.buffer.len()
            );
        }
        self.stats.embedded_lines += vectors.len() as u64;

        let communities = detect_communities(&vectors, &self.options.community);
        info!("found {} log communities", communities.len());
        if communities.is_empty() {
            warn!(
                "no community detected among {} lines, the similarity threshold ({}) may be too strict",
                self.buffer.len(),
                self.options.community.threshold
            );
            self.defer();
            return Ok(());
        }
        self.stats.communities += communities.len() as u64;

        for community in communities.iter().take(self.options.max_communities) {
            let members: Vec<&[f32]> = community.iter().map(|&i| vectors[i].as_slice()).collect();
            let texts: Vec<String> = diverse_triple(&members)
                .into_iter()
                .map(|pos| self.buffer[community[pos]].clone())
                .collect();
            info!("yield samples {:?}", texts);
            self.pending.push_back(texts);
            self.stats.sample_groups += 1;
        }
        self.recycle_after = Some(self.matcher.template_count());
        Ok(())
    }

    /// Keep the buffer for a later flush once another budget accumulates.
    fn defer(&mut self) {
        self.watermark = self.size.saturating_add(self.options.buffer_size);
    }

    fn recycle(&mut self, count_at_flush: usize) {
        let lines = mem::take(&mut self.buffer);
        self.size = 0;
        self.watermark = self.options.buffer_size;

        let learned = self.matcher.template_count().saturating_sub(count_at_flush);
        if learned == 0 {
            warn!(
                "no template learned from the last samples, {} lines stay unmatched",
                lines.len()
            );
            self.stats.unexplained += lines.len() as u64;
            return;
        }

        debug!(lines = lines.len(), learned, "recycling buffered lines");
        self.stats.recycled += lines.len() as u64;
        self.replay.send(lines);
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if !self.buffer.is_empty() {
            info!("{} unmatched lines left unexplained", self.buffer.len());
            self.stats.unexplained += self.buffer.len() as u64;
            self.buffer.clear();
            self.size = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LineSource;
    use crate::template::Template;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Embeds lines by their first word: same first word, same direction.
    struct FirstWordEmbedder {
        calls: Arc<AtomicUsize>,
    }

    fn first_word_vectors(texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 16];
                let first = t.split_whitespace().next().unwrap_or("");
                let bucket = first.bytes().map(|b| b as usize).sum::<usize>() % 16;
                v[bucket] = 1.0;
                v
            })
            .collect()
    }

    #[async_trait]
    impl Embedder for FirstWordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(first_word_vectors(texts))
        }
    }

    /// Fails its first call, then behaves like [`FirstWordEmbedder`].
    struct FlakyEmbedder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                bail!("connection reset");
            }
            Ok(first_word_vectors(texts))
        }
    }

    /// Drops the last vector.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut vectors = first_word_vectors(texts);
            vectors.pop();
            Ok(vectors)
        }
    }

    struct Disabled;

    #[async_trait]
    impl Embedder for Disabled {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("disabled")
        }
        fn is_enabled(&self) -> bool {
            false
        }
    }

    fn clusterer_with<E: Embedder>(
        text: &str,
        templates: Vec<Template>,
        buffer_size: usize,
        embedder: E,
    ) -> Clusterer<E> {
        let source = LineSource::from_texts([text.to_string()], 512);
        let replay = source.replay_queue();
        let matcher = Matcher::new(source, templates);
        let options = ClusterOptions {
            buffer_size,
            community: CommunityParams {
                threshold: 0.9,
                min_community_size: 3,
                batch_size: 8,
            },
            max_communities: 3,
        };
        Clusterer::new(matcher, embedder, replay, options)
    }

    fn clusterer(text: &str, templates: Vec<Template>, buffer_size: usize) -> (Clusterer<FirstWordEmbedder>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = FirstWordEmbedder { calls: calls.clone() };
        (clusterer_with(text, templates, buffer_size, embedder), calls)
    }

    fn sorted(mut lines: Vec<String>) -> Vec<String> {
        lines.sort();
        lines
    }

    async fn drain<E: Embedder>(c: &mut Clusterer<E>) -> Vec<Mined> {
        let mut out = Vec::new();
        while let Some(item) = c.next_item().await.unwrap() {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_records_pass_through_immediately() {
        let t = Template::compile(r"^ok (\d+)$").unwrap();
        let (mut c, calls) = clusterer("ok 1\nok 2\n", vec![t], 1 << 20);
        let out = drain(&mut c).await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| matches!(m, Mined::Record(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flush_at_boundary_yields_one_sample_group() {
        let text = "user alice logged in\nuser bob logged in\nuser carol logged in\ndisk error on sda1\n";
        let (mut c, calls) = clusterer(text, vec![], 1 << 20);

        let first = c.next_item().await.unwrap().unwrap();
        match first {
            Mined::Samples(samples) => {
                assert_eq!(samples.len(), 3);
                let mut sorted = samples.clone();
                sorted.sort();
                sorted.dedup();
                assert_eq!(sorted.len(), 3);
                assert!(samples.iter().all(|s| s.starts_with("user ")));
            }
            other => panic!("expected samples, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Nothing learned: lines are not recycled and the stream ends.
        assert!(c.next_item().await.unwrap().is_none());
        let stats = c.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.sample_groups, 1);
        assert_eq!(stats.recycled, 0);
        assert_eq!(stats.unexplained, 4);
    }

    #[tokio::test]
    async fn test_learned_template_recycles_whole_buffer() {
        let text = "user alice logged in\nuser bob logged in\nuser carol logged in\ndisk error on sda1\n";
        let (mut c, _) = clusterer(text, vec![], 1 << 20);

        assert!(matches!(c.next_item().await.unwrap(), Some(Mined::Samples(_))));
        c.matcher_mut()
            .learn(Template::compile(r"^user (\w+) logged in$").unwrap());

        let rest = drain(&mut c).await;
        let mut users: Vec<String> = rest
            .iter()
            .filter_map(|m| match m {
                Mined::Record(r) => r.groups[0].clone(),
                Mined::Samples(_) => None,
            })
            .collect();
        users.sort();
        assert_eq!(users, vec!["alice", "bob", "carol"]);

        let stats = c.stats();
        assert_eq!(stats.recycled, 4);
        // "disk error" comes back alone and never forms a community.
        assert_eq!(stats.unexplained, 1);
        assert_eq!(c.matcher().source().lines_replayed(), 4);
    }

    #[tokio::test]
    async fn test_too_few_lines_skip_embedding() {
        let (mut c, calls) = clusterer("a x\nb y\n", vec![], 1 << 20);
        assert!(drain(&mut c).await.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(c.stats().flushes, 1);
        assert_eq!(c.stats().unexplained, 2);
    }

    #[tokio::test]
    async fn test_byte_budget_forces_flush_before_boundary() {
        let text = "job 1 done\njob 2 done\njob 3 done\nok 7\n";
        let t = Template::compile(r"^ok (\d+)$").unwrap();
        let (mut c, _) = clusterer(text, vec![t], 30);
        // Three 10-byte lines reach the 30 byte budget before "ok 7" is read.
        assert!(matches!(c.next_item().await.unwrap(), Some(Mined::Samples(_))));
        assert_eq!(c.matcher().source().lines_read(), 3);
        assert!(matches!(c.next_item().await.unwrap(), Some(Mined::Record(_))));
    }

    #[tokio::test]
    async fn test_no_community_keeps_buffer() {
        let text = "alpha\nbeta\ngamma\ndelta\n";
        let (mut c, calls) = clusterer(text, vec![], 1 << 20);
        assert!(drain(&mut c).await.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.stats().communities, 0);
        assert_eq!(c.stats().unexplained, 4);
        assert_eq!(c.buffered(), 0);
    }

    #[tokio::test]
    async fn test_disabled_embedder_passes_records_only() {
        let source = LineSource::from_texts(["ok 1\nnope\n".to_string()], 512);
        let replay = source.replay_queue();
        let matcher = Matcher::new(source, vec![Template::compile(r"^ok (\d+)$").unwrap()]);
        let mut c = Clusterer::new(matcher, Disabled, replay, ClusterOptions::default());
        let out = drain(&mut c).await;
        assert_eq!(out.len(), 1);
        assert_eq!(c.stats().unexplained, 1);
        assert_eq!(c.stats().flushes, 0);
    }

    #[tokio::test]
    async fn test_embed_failure_keeps_lines_for_next_flush() {
        // 10-byte lines, 30 byte budget: the size-triggered flush fails,
        // the boundary flush embeds all five lines.
        let text = "job 1 done\njob 2 done\njob 3 done\njob 4 done\njob 5 done\n";
        let calls = Arc::new(AtomicUsize::new(0));
        let mut c = clusterer_with(text, vec![], 30, FlakyEmbedder { calls: calls.clone() });

        assert!(matches!(c.next_item().await.unwrap(), Some(Mined::Samples(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(c.buffered(), 5);

        let stats = c.stats();
        assert_eq!(stats.embed_failures, 1);
        assert_eq!(stats.flushes, 2);
        assert_eq!(stats.embedded_lines, 5);
        assert_eq!(stats.communities, 1);
    }

    #[tokio::test]
    async fn test_deferred_lines_join_later_community() {
        // The first three lines are pairwise dissimilar, so the first flush
        // finds nothing; two more "job" lines complete a community with
        // the first one.
        let text = "job 1 done\ncat 2 done\ndog 3 done\njob 4 done\njob 5 done\n";
        let (mut c, calls) = clusterer(text, vec![], 30);

        let samples = match c.next_item().await.unwrap() {
            Some(Mined::Samples(samples)) => samples,
            other => panic!("expected samples, got {:?}", other),
        };
        assert_eq!(
            sorted(samples),
            vec!["job 1 done", "job 4 done", "job 5 done"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = c.stats();
        assert_eq!(stats.flushes, 2);
        assert_eq!(stats.communities, 1);
        assert_eq!(stats.embedded_lines, 8);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_is_an_error() {
        let text = "job 1 done\njob 2 done\njob 3 done\n";
        let mut c = clusterer_with(text, vec![], 1 << 20, ShortEmbedder);
        let err = c.next_item().await.unwrap_err();
        assert!(err.to_string().contains("2 vectors for 3 lines"));
    }
}
