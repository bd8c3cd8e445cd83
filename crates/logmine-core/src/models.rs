//! Items that flow between pipeline stages.
//!
//! Each stage pulls from the one before it and emits a narrower item type:
//! the [`LineSource`](crate::source::LineSource) yields [`Feed`], the
//! [`Matcher`](crate::matcher::Matcher) yields [`Classified`], the
//! [`Clusterer`](crate::cluster::Clusterer) yields [`Mined`] and the
//! [`Extractor`](crate::extract::Extractor) yields [`MatchedRecord`]s only.

use serde::Serialize;

/// Output of the line source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// A length-bounded raw line.
    Line(String),
    /// No more lines are available right now without new input.
    Boundary,
}

/// A line that matched a known template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRecord {
    /// Literal pattern text of the template that matched.
    pub template: String,
    /// The raw line.
    pub line: String,
    /// Captured groups in order; `None` for groups that did not participate.
    pub groups: Vec<Option<String>>,
}

impl MatchedRecord {
    /// Number of capture groups carried by the record.
    pub fn arity(&self) -> usize {
        self.groups.len()
    }
}

/// Output of the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Matched(MatchedRecord),
    Unmatched(String),
    Boundary,
}

/// Output of the clusterer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mined {
    /// A matched record passed through untouched.
    Record(MatchedRecord),
    /// Diverse representative lines of one similarity community.
    Samples(Vec<String>),
}
