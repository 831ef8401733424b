//! Sanity Checker: stateless, data-driven plausibility passes over
//! accumulated response text.
//!
//! Rules are a plain data table (trigger keywords on the query → an
//! extractor regex over the response → a plausible numeric range), not
//! special-cased code, per the crate's own extensibility requirement — the
//! checker must function with an empty rule set and simply never escalate.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity bucket for a [`SanityResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Medium,
    High,
}

/// Output of a single sanity pass.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SanityResult {
    pub suspicious: bool,
    pub issues: Vec<String>,
    pub severity: Severity,
}

impl SanityResult {
    pub fn clean() -> Self {
        Self::default()
    }

    /// `should_escalate ⇔ suspicious ∧ severity = high`.
    pub fn should_escalate(&self) -> bool {
        self.suspicious && self.severity == Severity::High
    }
}

/// Which bucket a rule belongs to when it fires. `Hard` rules drive
/// `severity=high`; anything else contributes `severity=medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Hard,
    Soft,
}

/// One data-driven plausibility rule.
///
/// `trigger_keywords` gate the rule to queries it's relevant for (any
/// substring match, case-insensitive); `extractor` pulls a numeric value out
/// of the response text; the rule fires when the extracted value falls
/// outside `[min, max]`.
///
/// Fields are owned rather than `&'static str` so rules can be built at
/// runtime from a caller-supplied config table (see `super::config`), not
/// only from the compiled-in starter set.
pub struct SanityRule {
    pub name: String,
    pub trigger_keywords: Vec<String>,
    pub extractor: Regex,
    pub min: f64,
    pub max: f64,
    pub category: RuleCategory,
    pub message_template: String,
}

impl SanityRule {
    fn applies_to_query(&self, query_lower: &str) -> bool {
        self.trigger_keywords
            .iter()
            .any(|kw| query_lower.contains(kw.as_str()))
    }

    /// Extract the first numeric capture group, if the regex matches.
    fn extract(&self, text: &str) -> Option<f64> {
        let caps = self.extractor.captures(text)?;
        caps.get(1)?.as_str().parse::<f64>().ok()
    }
}

/// Stateless, data-driven sanity checker.
pub struct SanityChecker {
    rules: Vec<SanityRule>,
}

impl SanityChecker {
    pub fn new(rules: Vec<SanityRule>) -> Self {
        Self { rules }
    }

    /// An empty rule set: the checker functions, but never escalates.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The starter battery-pack rule set carried forward from the domain's
    /// physical-limits table: cell voltage, cell capacity, and pack energy.
    pub fn default_rules() -> Self {
        Self::new(vec![
            SanityRule {
                name: "cell_nominal_voltage".to_string(),
                trigger_keywords: owned(&["voltage", "nominal voltage", " v "]),
                extractor: regex_unwrap(r"(\d+(?:\.\d+)?)\s*v\b"),
                min: 2.5,
                max: 4.3,
                category: RuleCategory::Soft,
                message_template: "Claimed cell nominal voltage {value}V is outside the plausible 2.5-4.3V range for common lithium cell chemistries".to_string(),
            },
            SanityRule {
                name: "cell_nominal_capacity_ah".to_string(),
                trigger_keywords: owned(&["21700", "18650", "capacity", "ah", "cell"]),
                extractor: regex_unwrap(r"(\d+(?:\.\d+)?)\s*ah\b"),
                min: 0.5,
                max: 6.0,
                category: RuleCategory::Hard,
                message_template: "Claimed cell capacity {value}Ah is implausible for a single cylindrical cell (expected roughly 0.5-6.0Ah)".to_string(),
            },
            SanityRule {
                name: "pack_total_energy_kwh".to_string(),
                trigger_keywords: owned(&["pack", "kwh", "total energy"]),
                extractor: regex_unwrap(r"(\d+(?:\.\d+)?)\s*kwh\b"),
                min: 0.01,
                max: 200.0,
                category: RuleCategory::Soft,
                message_template: "Claimed pack energy {value}kWh is outside the plausible range for a hobbyist/EV battery pack".to_string(),
            },
        ])
    }

    /// Run every applicable rule against `response_text`, given the
    /// originating `query_text`.
    pub fn check_response(&self, response_text: &str, query_text: &str) -> SanityResult {
        let query_lower = query_text.to_lowercase();
        let response_lower = response_text.to_lowercase();

        let mut issues = Vec::new();
        let mut hard_fired = false;

        for rule in &self.rules {
            if !rule.applies_to_query(&query_lower) {
                continue;
            }
            let Some(value) = rule.extract(&response_lower) else {
                continue;
            };
            if value < rule.min || value > rule.max {
                issues.push(rule.message_template.replace("{value}", &value.to_string()));
                if rule.category == RuleCategory::Hard {
                    hard_fired = true;
                }
            }
        }

        let severity = if hard_fired {
            Severity::High
        } else if !issues.is_empty() {
            Severity::Medium
        } else {
            Severity::None
        };

        SanityResult {
            suspicious: !issues.is_empty(),
            issues,
            severity,
        }
    }
}

impl Default for SanityChecker {
    fn default() -> Self {
        Self::default_rules()
    }
}

fn owned(strs: &[&str]) -> Vec<String> {
    strs.iter().map(|s| (*s).to_string()).collect()
}

fn regex_unwrap(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => unreachable!("static sanity rule regex {pattern:?} must compile: {e}"),
    }
}
