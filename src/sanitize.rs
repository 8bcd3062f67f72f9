//! Label name sanitization for the remote Alertmanager.
//!
//! The remote endpoint only accepts label names matching
//! `^[A-Za-z_][A-Za-z0-9_]*$`. Names are rewritten deterministically, and
//! names that collide after rewriting are disambiguated with a suffix derived
//! from the original key.

use crate::core::Label;
use crate::errors::SanitizeError;
use itertools::Itertools;
use std::collections::HashSet;
use tracing::warn;

/// Returns true if `c` may appear at `position` in a label name.
fn is_valid_char(c: char, position: usize) -> bool {
    c.is_ascii_alphabetic() || c == '_' || (position > 0 && c.is_ascii_digit())
}

/// Returns true if `name` already satisfies the label name syntax.
pub fn is_valid_label_name(name: &str) -> bool {
    !name.is_empty() && name.chars().enumerate().all(|(i, c)| is_valid_char(c, i))
}

/// Rewrites `name` into a valid label name.
///
/// Whitespace is removed. Other invalid ASCII characters become `_`, and
/// non-ASCII characters are replaced by their hex code point (`0x1f633`),
/// prefixed with `_` when they open the name.
pub fn sanitize_label_name(name: &str) -> Result<String, SanitizeError> {
    if name.is_empty() {
        return Err(SanitizeError::Empty);
    }
    if is_valid_label_name(name) {
        return Ok(name.to_string());
    }

    let mut sanitized = String::with_capacity(name.len());
    for (i, c) in name.chars().filter(|c| !c.is_whitespace()).enumerate() {
        if is_valid_char(c, i) {
            sanitized.push(c);
        } else if (c as u32) <= 127 {
            sanitized.push('_');
        } else {
            if i == 0 {
                sanitized.push('_');
            }
            sanitized.push_str(&format!("{:#x}", c as u32));
        }
    }

    if sanitized.is_empty() {
        return Err(SanitizeError::EmptyAfterSanitization(name.to_string()));
    }
    Ok(sanitized)
}

/// Suffix appended to a colliding name: `_` and the first three bytes of the
/// MD5 digest of the original key, hex encoded.
fn collision_suffix(original: &str) -> String {
    let digest = md5::compute(original.as_bytes());
    format!("_{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2])
}

/// Sanitizes every name in a label set.
///
/// Keys are processed in sorted order so collision resolution does not
/// depend on the iteration order of the input. Names that cannot be
/// sanitized are skipped.
pub fn sanitize_label_set<'a, I>(labels: I) -> Vec<Label>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for (key, value) in labels.into_iter().sorted_by(|a, b| a.0.cmp(b.0)) {
        let mut name = match sanitize_label_name(key) {
            Ok(name) => name,
            Err(e) => {
                warn!(label = %key, error = %e, "Skipping label that could not be sanitized");
                continue;
            }
        };

        if seen.contains(&name) {
            name.push_str(&collision_suffix(key));
            if seen.contains(&name) {
                warn!(label = %key, sanitized = %name, "Skipping label with unresolvable name collision");
                continue;
            }
        }

        seen.insert(name.clone());
        result.push(Label::new(name, value.clone()));
    }

    result
}
