//! Template inference feedback.
//!
//! The [`Extractor`] is the last pipeline stage. It forwards matched
//! records and sends every sample group to a [`TemplateOracle`]. The
//! oracle's reply is decoded with two strategies, the structured call
//! arguments first and the raw message content second; a template that
//! survives decoding is appended to the matcher. A sample group whose reply
//! cannot be decoded is logged and dropped.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cluster::Clusterer;
use crate::embedding::Embedder;
use crate::matcher::Matcher;
use crate::models::{MatchedRecord, Mined};
use crate::template::Template;

/// Raw answer of a template oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceReply {
    /// JSON arguments of a structured function/tool call, if any.
    pub call_arguments: Option<String>,
    /// Plain message content, if any.
    pub content: Option<String>,
}

/// Template inference capability: one call per sample group.
#[async_trait]
pub trait TemplateOracle: Send + Sync {
    async fn infer(&self, samples: &[String]) -> Result<InferenceReply>;
}

#[async_trait]
impl<T: TemplateOracle + ?Sized> TemplateOracle for Box<T> {
    async fn infer(&self, samples: &[String]) -> Result<InferenceReply> {
        (**self).infer(samples).await
    }
}

/// Why a reply did not yield a usable template.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("reply has no {0}")]
    Missing(&'static str),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("pattern has no capture group: {0}")]
    NoCaptureGroups(String),
    #[error("pattern matches none of its samples: {0}")]
    MatchesNoSample(String),
    #[error("pattern is already known: {0}")]
    AlreadyKnown(String),
}

#[derive(Deserialize)]
struct PatternArgs {
    pattern: String,
}

fn decode_pattern(json: Option<&str>, what: &'static str) -> Result<Template, InferenceError> {
    let json = json.ok_or(InferenceError::Missing(what))?;
    let args: PatternArgs = serde_json::from_str(json)?;
    let template = Template::compile(&args.pattern)?;
    if template.arity() == 0 {
        return Err(InferenceError::NoCaptureGroups(args.pattern));
    }
    Ok(template)
}

/// Decode a reply: call arguments first, then message content.
///
/// On double failure the error of the content strategy is returned; the
/// first error is logged as a warning.
pub fn decode_template(reply: &InferenceReply) -> Result<Template, InferenceError> {
    match decode_pattern(reply.call_arguments.as_deref(), "call arguments") {
        Ok(t) => Ok(t),
        Err(e) => {
            warn!("failed to decode call arguments: {}, guessing from content", e);
            decode_pattern(reply.content.as_deref(), "content")
        }
    }
}

/// Check a decoded template against the samples it was inferred from.
pub fn validate_template(
    template: &Template,
    samples: &[String],
    matcher: &Matcher,
) -> Result<(), InferenceError> {
    if matcher.knows(template.as_str()) {
        return Err(InferenceError::AlreadyKnown(template.as_str().to_string()));
    }
    if !samples.iter().any(|s| template.is_match(s)) {
        return Err(InferenceError::MatchesNoSample(template.as_str().to_string()));
    }
    Ok(())
}

/// Counters for the extraction stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub inferences: u64,
    pub learned: u64,
    pub failures: u64,
}

/// Final pull stage: yields matched records, learns from sample groups.
pub struct Extractor<E, O> {
    clusterer: Clusterer<E>,
    oracle: O,
    stats: ExtractStats,
}

impl<E: Embedder, O: TemplateOracle> Extractor<E, O> {
    pub fn new(clusterer: Clusterer<E>, oracle: O) -> Self {
        Self {
            clusterer,
            oracle,
            stats: ExtractStats::default(),
        }
    }

    pub fn clusterer(&self) -> &Clusterer<E> {
        &self.clusterer
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    pub fn into_clusterer(self) -> Clusterer<E> {
        self.clusterer
    }

    /// Pull the next matched record. `Ok(None)` ends the stream.
    pub async fn next_record(&mut self) -> Result<Option<MatchedRecord>> {
        loop {
            match self.clusterer.next_item().await? {
                None => return Ok(None),
                Some(Mined::Record(record)) => return Ok(Some(record)),
                Some(Mined::Samples(samples)) => self.learn_from(&samples).await,
            }
        }
    }

    async fn learn_from(&mut self, samples: &[String]) {
        self.stats.inferences += 1;
        info!("thinking about the template of logs: {:?}", samples);

        let reply = match self.oracle.infer(samples).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("template inference failed: {:#}", e);
                self.stats.failures += 1;
                return;
            }
        };

        let template = decode_template(&reply).and_then(|t| {
            validate_template(&t, samples, self.clusterer.matcher())?;
            Ok(t)
        });
        match template {
            Ok(t) => {
                info!("extracted template: {}", t);
                self.clusterer.matcher_mut().learn(t);
                self.stats.learned += 1;
            }
            Err(e) => {
                error!("failed to compile template from {:?}: {}", reply, e);
                self.stats.failures += 1;
            }
        }
    }
}
