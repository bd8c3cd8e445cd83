//! First-match template classification.
//!
//! The [`Matcher`] keeps an ordered list of templates. Order is insertion
//! order: seeded templates come first, learned ones are appended, and the
//! first template that matches a line wins. Nothing is ever reordered.

use std::io;

use crate::models::{Classified, Feed};
use crate::source::LineSource;
use crate::template::Template;

/// Pull stage that classifies each line from its [`LineSource`].
pub struct Matcher {
    source: LineSource,
    templates: Vec<Template>,
    matched: u64,
    unmatched: u64,
}

impl Matcher {
    /// Build a matcher over `source`, seeded with `templates` in priority order.
    pub fn new(source: LineSource, templates: Vec<Template>) -> Self {
        Self {
            source,
            templates,
            matched: 0,
            unmatched: 0,
        }
    }

    /// Classify one feed item. Boundaries pass through untouched.
    pub fn classify(&self, item: Feed) -> Classified {
        match item {
            Feed::Boundary => Classified::Boundary,
            Feed::Line(line) => self
                .templates
                .iter()
                .find_map(|t| t.apply(&line))
                .map(Classified::Matched)
                .unwrap_or(Classified::Unmatched(line)),
        }
    }

    /// Append a template with the lowest priority. No validation is done.
    pub fn learn(&mut self, template: Template) {
        self.templates.push(template);
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Whether a template with the same pattern text is already known.
    pub fn knows(&self, pattern: &str) -> bool {
        self.templates.iter().any(|t| t.as_str() == pattern)
    }

    pub fn source(&self) -> &LineSource {
        &self.source
    }

    /// Lines classified as matched so far (replays included).
    pub fn matched(&self) -> u64 {
        self.matched
    }

    /// Lines classified as unmatched so far (replays included).
    pub fn unmatched(&self) -> u64 {
        self.unmatched
    }

    pub fn into_templates(self) -> Vec<Template> {
        self.templates
    }
}

impl Iterator for Matcher {
    type Item = io::Result<Classified>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.source.next()? {
            Ok(item) => item,
            Err(e) => return Some(Err(e)),
        };
        let classified = self.classify(item);
        match &classified {
            Classified::Matched(_) => self.matched += 1,
            Classified::Unmatched(_) => self.unmatched += 1,
            Classified::Boundary => {}
        }
        Some(Ok(classified))
    }
}
