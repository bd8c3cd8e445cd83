//! # logmine
//!
//! Mine recurring templates out of unstructured logs.
//!
//! The streaming pipeline itself lives in `logmine-core`; this crate adds
//! configuration, concrete embedding and inference providers, the pattern
//! memory and the SQLite field store, and the `logmine` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────────────────────────┐   ┌──────────┐
//! │ inputs  │──▶│ logmine-core Pipeline          │──▶│  SQLite   │
//! │ files/- │   │ match ─ cluster ─ infer ─ learn│   │ 1 table / │
//! └─────────┘   └──────┬───────────────┬────────┘   │ template  │
//!                      │               │            └──────────┘
//!                ┌─────▼─────┐   ┌─────▼──────┐
//!                │ embedding │   │ inference  │
//!                │ providers │   │ (chat API) │
//!                └───────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`inputs`] | Input path and glob expansion |
//! | [`embedding`] | Embedding providers |
//! | [`inference`] | Template oracles |
//! | [`http`] | JSON POST with retry and backoff |
//! | [`memory`] | Per-source pattern memory |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Per-template field tables |
//! | [`mine`] | The `run` command |
//! | [`tables`] | The `tables` command |
//! | [`patterns`] | The `patterns` and `clean` commands |
//! | [`progress`] | Run progress on stderr |

pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod inference;
pub mod inputs;
pub mod memory;
pub mod migrate;
pub mod mine;
pub mod patterns;
pub mod progress;
pub mod store;
pub mod tables;
