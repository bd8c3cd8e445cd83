//! Pattern memory.
//!
//! A single JSON document mapping a source key (the run's input arguments)
//! to named fields. The `patterns` field holds the templates learned for
//! that source so the next run over the same inputs starts with them and
//! needs no inference for already-known shapes.
//!
//! ```json
//! {
//!   "logs/app.log": {
//!     "patterns": { "kind": "patterns", "value": ["^user (\\w+) logged in$"] }
//!   }
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use logmine_core::template::Template;

/// Field holding a source's learned templates.
pub const PATTERNS_FIELD: &str = "patterns";

/// A stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MemoryValue {
    Patterns(Vec<Template>),
    Text(String),
}

type Document = BTreeMap<String, BTreeMap<String, MemoryValue>>;

fn read_document(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Ok(Document::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pattern memory: {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Document::new());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("Pattern memory is corrupt: {}", path.display()))
}

/// The pattern memory file.
pub struct PatternMemory;

impl PatternMemory {
    /// Open the session for `key`, creating the file's directory and an
    /// empty document when missing.
    pub fn open(path: &Path, key: &str) -> Result<MemorySession> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create memory directory: {}", parent.display())
                })?;
            }
        }
        let mut document = read_document(path)?;
        document.entry(key.to_string()).or_default();
        debug!(path = %path.display(), key, "opened pattern memory");

        Ok(MemorySession {
            path: path.to_path_buf(),
            key: key.to_string(),
            document,
        })
    }

    /// Every source key with its remembered templates.
    pub fn sources(path: &Path) -> Result<Vec<(String, Vec<Template>)>> {
        let document = read_document(path)?;
        Ok(document
            .into_iter()
            .map(|(key, fields)| {
                let templates = match fields.get(PATTERNS_FIELD) {
                    Some(MemoryValue::Patterns(t)) => t.clone(),
                    _ => Vec::new(),
                };
                (key, templates)
            })
            .collect())
    }

    /// Delete the memory file. Returns whether anything was removed.
    pub fn clean(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove pattern memory: {}", path.display()))?;
        Ok(true)
    }
}

/// The fields of one source key, written back on [`close`](Self::close).
pub struct MemorySession {
    path: PathBuf,
    key: String,
    document: Document,
}

impl MemorySession {
    pub fn key(&self) -> &str {
        &self.key
    }

    fn fields(&mut self) -> &mut BTreeMap<String, MemoryValue> {
        self.document.entry(self.key.clone()).or_default()
    }

    /// The stored value of `field`, inserting `default` when absent.
    pub fn load(&mut self, field: &str, default: MemoryValue) -> MemoryValue {
        self.fields()
            .entry(field.to_string())
            .or_insert(default)
            .clone()
    }

    pub fn store(&mut self, field: &str, value: MemoryValue) {
        self.fields().insert(field.to_string(), value);
    }

    /// Remembered templates of this source.
    pub fn load_patterns(&mut self) -> Result<Vec<Template>> {
        match self.load(PATTERNS_FIELD, MemoryValue::Patterns(Vec::new())) {
            MemoryValue::Patterns(templates) => Ok(templates),
            MemoryValue::Text(_) => bail!(
                "Pattern memory field '{}' of '{}' does not hold patterns",
                PATTERNS_FIELD,
                self.key
            ),
        }
    }

    pub fn store_patterns(&mut self, templates: Vec<Template>) {
        self.store(PATTERNS_FIELD, MemoryValue::Patterns(templates));
    }

    /// Write the whole document back.
    pub fn close(self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.document)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write pattern memory: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write pattern memory: {}", self.path.display()))?;
        debug!(path = %self.path.display(), key = %self.key, "saved pattern memory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory_and_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("patterns.json");

        let mut session = PatternMemory::open(&path, "app.log").unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(session.load_patterns().unwrap().is_empty());
        let text = session.load("note", MemoryValue::Text("hello".into()));
        assert_eq!(text, MemoryValue::Text("hello".into()));
        session.close().unwrap();

        let stored = std::fs::read_to_string(&path).unwrap();
        assert!(stored.contains("\"kind\": \"text\""));
    }

    #[test]
    fn test_patterns_survive_sessions() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patterns.json");

        let mut session = PatternMemory::open(&path, "a.log,b.log").unwrap();
        session.store_patterns(vec![
            Template::compile(r"^user (\w+) logged in$").unwrap(),
            Template::compile(r"^disk (\w+) full$").unwrap(),
        ]);
        session.close().unwrap();

        let mut other = PatternMemory::open(&path, "other.log").unwrap();
        assert!(other.load_patterns().unwrap().is_empty());
        other.close().unwrap();

        let mut session = PatternMemory::open(&path, "a.log,b.log").unwrap();
        let templates = session.load_patterns().unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].as_str(), r"^user (\w+) logged in$");

        let sources = PatternMemory::sources(&path).unwrap();
        let keys: Vec<&str> = sources.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a.log,b.log", "other.log"]);
    }

    #[test]
    fn test_unclosed_session_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patterns.json");

        let mut session = PatternMemory::open(&path, "x").unwrap();
        session.store_patterns(vec![Template::compile(r"^(x)$").unwrap()]);
        drop(session);
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_memory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patterns.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(PatternMemory::open(&path, "x").is_err());

        std::fs::write(
            &path,
            r#"{"x": {"patterns": {"kind": "patterns", "value": ["^(unclosed$"]}}}"#,
        )
        .unwrap();
        assert!(PatternMemory::open(&path, "x").is_err());
    }

    #[test]
    fn test_clean() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patterns.json");
        assert!(!PatternMemory::clean(&path).unwrap());
        PatternMemory::open(&path, "x").unwrap().close().unwrap();
        assert!(PatternMemory::clean(&path).unwrap());
        assert!(!path.exists());
    }
}
