//! Label matchers used by silences and by alert/silence filters.
//!
//! Filters are written in the Alertmanager expression syntax:
//! `name="value"`, `name!="value"`, `name=~"regex"` and `name!~"regex"`.
//! Quotes around the value are optional.

use crate::core::{LabelSet, Matcher};
use crate::errors::BackendError;
use regex::Regex;

/// A matcher with its regex compiled, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    name: String,
    value: String,
    regex: Option<Regex>,
    is_equal: bool,
}

impl CompiledMatcher {
    pub fn compile(matcher: &Matcher) -> Result<Self, BackendError> {
        let regex = if matcher.is_regex {
            let anchored = format!("^(?:{})$", matcher.value);
            Some(Regex::new(&anchored).map_err(|e| {
                BackendError::InvalidFilter(format!("invalid regex '{}': {}", matcher.value, e))
            })?)
        } else {
            None
        };
        Ok(Self {
            name: matcher.name.clone(),
            value: matcher.value.clone(),
            regex,
            is_equal: matcher.is_equal,
        })
    }

    /// Evaluates the matcher against a label set. A missing label is treated
    /// as the empty string.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let value = labels.get(&self.name).map(String::as_str).unwrap_or("");
        let matched = match &self.regex {
            Some(re) => re.is_match(value),
            None => value == self.value,
        };
        matched == self.is_equal
    }
}

/// Parses a single filter expression into a [`Matcher`].
pub fn parse_matcher(expr: &str) -> Result<Matcher, BackendError> {
    let expr = expr.trim();
    let invalid = || BackendError::InvalidFilter(format!("bad matcher format: {}", expr));

    // Operators are checked longest first so "!=" is not read as "=".
    let (pos, op) = ["=~", "!~", "!=", "="]
        .iter()
        .filter_map(|op| expr.find(op).map(|pos| (pos, *op)))
        .min_by_key(|(pos, op)| (*pos, usize::MAX - op.len()))
        .ok_or_else(invalid)?;

    let name = expr[..pos].trim();
    if name.is_empty() {
        return Err(invalid());
    }
    let raw_value = expr[pos + op.len()..].trim();
    let value = unquote(raw_value).ok_or_else(invalid)?;

    let (is_regex, is_equal) = match op {
        "=" => (false, true),
        "!=" => (false, false),
        "=~" => (true, true),
        _ => (true, false),
    };

    Ok(Matcher {
        name: name.to_string(),
        value,
        is_regex,
        is_equal,
    })
}

fn unquote(raw: &str) -> Option<String> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        Some(raw[1..raw.len() - 1].replace("\\\"", "\""))
    } else if raw.contains('"') {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Parses and compiles a list of filter expressions.
pub fn parse_filter(filter: &[String]) -> Result<Vec<CompiledMatcher>, BackendError> {
    filter
        .iter()
        .map(|expr| parse_matcher(expr).and_then(|m| CompiledMatcher::compile(&m)))
        .collect()
}

/// Returns true when every matcher matches `labels`.
pub fn matches_all(matchers: &[CompiledMatcher], labels: &LabelSet) -> bool {
    matchers.iter().all(|m| m.matches(labels))
}
