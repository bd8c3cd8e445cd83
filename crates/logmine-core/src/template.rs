//! Compiled log templates.
//!
//! A [`Template`] is a regular expression with capture groups. Its literal
//! pattern text is its identity: it names the template in pattern memory
//! and in the field store, and it is how the template is serialized.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::models::MatchedRecord;

/// A compiled template identified by its pattern text.
#[derive(Clone)]
pub struct Template {
    regex: Regex,
}

impl Template {
    /// Compile `pattern` into a template.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// The literal pattern text.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Number of capture groups, excluding the implicit whole-match group.
    pub fn arity(&self) -> usize {
        self.regex.captures_len() - 1
    }

    /// Match `line` from its first character.
    ///
    /// The regex engine reports the leftmost match, so a match starting at
    /// offset 0 is found whenever one exists. The end of the line is not
    /// implicitly anchored; patterns add `$` themselves.
    pub fn captures(&self, line: &str) -> Option<Vec<Option<String>>> {
        let caps = self.regex.captures(line)?;
        if caps.get(0)?.start() != 0 {
            return None;
        }
        Some(
            caps.iter()
                .skip(1)
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect(),
        )
    }

    /// Whether the template matches `line` from its first character.
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.find(line).is_some_and(|m| m.start() == 0)
    }

    /// Build the record for `line`, if it matches.
    pub fn apply(&self, line: &str) -> Option<MatchedRecord> {
        self.captures(line).map(|groups| MatchedRecord {
            template: self.as_str().to_string(),
            line: line.to_string(),
            groups,
        })
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Template {}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Template::compile(&pattern).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_groups_in_order() {
        let t = Template::compile(r"^user (\w+) logged in from (\S+)$").unwrap();
        assert_eq!(t.arity(), 2);
        assert_eq!(
            t.captures("user alice logged in from 10.0.0.1"),
            Some(vec![Some("alice".into()), Some("10.0.0.1".into())])
        );
    }

    #[test]
    fn test_match_must_start_at_line_start() {
        let t = Template::compile(r"error (\d+)").unwrap();
        assert!(t.is_match("error 42 in module"));
        assert!(!t.is_match("fatal error 42"));
        assert!(t.captures("fatal error 42").is_none());
    }

    #[test]
    fn test_optional_group_is_none() {
        let t = Template::compile(r"^code(?: (\d+))?(!)?$").unwrap();
        assert_eq!(t.captures("code!"), Some(vec![None, Some("!".into())]));
    }

    #[test]
    fn test_apply_builds_record() {
        let t = Template::compile(r"^disk error on (\w+)$").unwrap();
        let record = t.apply("disk error on sda1").unwrap();
        assert_eq!(record.template, r"^disk error on (\w+)$");
        assert_eq!(record.line, "disk error on sda1");
        assert_eq!(record.groups, vec![Some("sda1".to_string())]);
        assert!(t.apply("disk ok").is_none());
    }

    #[test]
    fn test_serializes_as_pattern_text() {
        let t = Template::compile(r"^a (\d+)$").unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#""^a (\\d+)$""#);
        let back: Template = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_deserialize_rejects_invalid_pattern() {
        let result: Result<Template, _> = serde_json::from_str(r#""^a (unclosed$""#);
        assert!(result.is_err());
    }
}
