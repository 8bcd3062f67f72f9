//! Prometheus-style relabeling applied to alerts before they are queued.

use crate::core::Label;
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The action a relabel rule performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelabelAction {
    #[default]
    Replace,
    Keep,
    Drop,
    HashMod,
    LabelMap,
    LabelDrop,
    LabelKeep,
}

/// A relabel rule as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelabelConfig {
    pub source_labels: Vec<String>,
    pub separator: String,
    pub regex: String,
    pub modulus: u64,
    pub target_label: String,
    pub replacement: String,
    pub action: RelabelAction,
}

impl Default for RelabelConfig {
    fn default() -> Self {
        Self {
            source_labels: Vec::new(),
            separator: ";".to_string(),
            regex: "(.*)".to_string(),
            modulus: 0,
            target_label: String::new(),
            replacement: "$1".to_string(),
            action: RelabelAction::Replace,
        }
    }
}

/// A validated relabel rule with its regex compiled.
#[derive(Debug, Clone)]
pub struct RelabelRule {
    config: RelabelConfig,
    regex: Regex,
}

impl RelabelRule {
    pub fn new(config: RelabelConfig) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", config.regex))
            .with_context(|| format!("invalid relabel regex '{}'", config.regex))?;

        match config.action {
            RelabelAction::Replace | RelabelAction::HashMod if config.target_label.is_empty() => {
                bail!("relabel action {:?} requires a target_label", config.action)
            }
            RelabelAction::HashMod if config.modulus == 0 => {
                bail!("relabel action hashmod requires a non-zero modulus")
            }
            _ => {}
        }

        Ok(Self { config, regex })
    }
}

/// Compiles a list of relabel configs, failing on the first invalid one.
pub fn compile(configs: &[RelabelConfig]) -> Result<Vec<RelabelRule>> {
    configs.iter().cloned().map(RelabelRule::new).collect()
}

fn get<'a>(labels: &'a [Label], name: &str) -> Option<&'a str> {
    labels.iter().find(|l| l.name == name).map(|l| l.value.as_str())
}

fn set(labels: &mut Vec<Label>, name: &str, value: String) {
    if value.is_empty() {
        labels.retain(|l| l.name != name);
        return;
    }
    match labels.iter_mut().find(|l| l.name == name) {
        Some(label) => label.value = value,
        None => labels.push(Label::new(name, value)),
    }
}

/// Runs `rules` in order over `labels`.
///
/// Returns `None` when a rule drops the alert. The returned labels are
/// sorted by name.
pub fn process(mut labels: Vec<Label>, rules: &[RelabelRule]) -> Option<Vec<Label>> {
    for rule in rules {
        let cfg = &rule.config;
        let source = cfg
            .source_labels
            .iter()
            .map(|name| get(&labels, name).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(&cfg.separator);

        match cfg.action {
            RelabelAction::Drop => {
                if rule.regex.is_match(&source) {
                    return None;
                }
            }
            RelabelAction::Keep => {
                if !rule.regex.is_match(&source) {
                    return None;
                }
            }
            RelabelAction::Replace => {
                if let Some(caps) = rule.regex.captures(&source) {
                    let mut target = String::new();
                    caps.expand(&cfg.target_label, &mut target);
                    let mut value = String::new();
                    caps.expand(&cfg.replacement, &mut value);
                    if !target.is_empty() {
                        set(&mut labels, &target, value);
                    }
                }
            }
            RelabelAction::HashMod => {
                let digest = md5::compute(source.as_bytes());
                let mut tail = [0u8; 8];
                tail.copy_from_slice(&digest[8..]);
                let value = u64::from_be_bytes(tail) % cfg.modulus;
                set(&mut labels, &cfg.target_label, value.to_string());
            }
            RelabelAction::LabelMap => {
                let mapped: Vec<(String, String)> = labels
                    .iter()
                    .filter_map(|l| {
                        rule.regex.captures(&l.name).map(|caps| {
                            let mut name = String::new();
                            caps.expand(&cfg.replacement, &mut name);
                            (name, l.value.clone())
                        })
                    })
                    .collect();
                for (name, value) in mapped {
                    set(&mut labels, &name, value);
                }
            }
            RelabelAction::LabelDrop => labels.retain(|l| !rule.regex.is_match(&l.name)),
            RelabelAction::LabelKeep => labels.retain(|l| rule.regex.is_match(&l.name)),
        }
    }

    labels.sort_by(|a, b| a.name.cmp(&b.name));
    Some(labels)
}
