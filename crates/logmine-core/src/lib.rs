//! # logmine-core
//!
//! The streaming classification/clustering pipeline behind `logmine`.
//!
//! Raw log lines flow through four pull-based stages. Lines the current
//! templates cannot explain are buffered, embedded, grouped into similarity
//! communities and sampled; the samples go to a template oracle whose answer
//! is fed back into the matcher, and the buffered lines are replayed so they
//! get a second chance against the new template.
//!
//! ```text
//! ┌────────────┐   ┌─────────┐   ┌───────────┐   ┌───────────┐
//! │ LineSource │──▶│ Matcher │──▶│ Clusterer │──▶│ Extractor │──▶ records
//! └─────▲──────┘   └────▲────┘   └─────┬─────┘   └─────┬─────┘
//!       │   replay      │   learn      │               │
//!       └───────────────┼──────────────┘               │
//!                       └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Items flowing between stages |
//! | [`source`] | Line source and replay queue |
//! | [`template`] | Compiled templates |
//! | [`matcher`] | First-match template classification |
//! | [`embedding`] | Embedder capability and vector helpers |
//! | [`community`] | Fast community detection over embeddings |
//! | [`sample`] | Diverse triple selection inside a community |
//! | [`cluster`] | Buffering, flushing and recycling of unmatched lines |
//! | [`extract`] | Template oracle capability and reply decoding |
//! | [`pipeline`] | Stage wiring and run statistics |
//!
//! Concrete embedders, oracles and stores live in the `logmine` app crate.

pub mod cluster;
pub mod community;
pub mod embedding;
pub mod extract;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod sample;
pub mod source;
pub mod template;
