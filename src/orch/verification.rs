//! [`VerificationResult`] and its nested payload types, produced by the
//! Specialist Verifier.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Confidence bucket used throughout a [`VerificationResult`]'s `confidence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for ConfidenceLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(()),
        }
    }
}

/// How much a cited source should be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for TrustLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(()),
        }
    }
}

/// A single cited source backing a [`VerifiedSpecs`] claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub label: String,
    pub url: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub trust_level: TrustLevel,
}

/// Specialist-verified facts about a cell or component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedSpecs {
    pub cell_type: String,
    pub nominal_voltage_v: f64,
    pub nominal_capacity_ah: f64,
    pub allowed_capacity_range_ah: HashMap<String, f64>,
    pub sources: Vec<Source>,
}

/// A battery pack energy calculation, as corrected/confirmed by the specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackCalculation {
    pub series_cells: i64,
    pub parallel_cells: i64,
    pub pack_nominal_voltage_v: f64,
    pub pack_total_ah: f64,
    pub pack_total_wh: f64,
    pub pack_total_kwh: f64,
}

/// A usable-range estimate derived from a pack calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeEstimate {
    pub usable_wh: f64,
    pub runtime_hours: f64,
    pub ideal_range_miles: f64,
    pub realistic_range_miles: f64,
}

/// A single flagged problem with a field of the analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub field: String,
    pub problem: String,
    /// Left as a raw string rather than a typed enum: the specialist's own
    /// severity vocabulary ("info"/"warning"/"error") is distinct from
    /// `SanityResult::severity`'s ("none"/"medium"/"high") and is not
    /// normalized here, matching upstream behavior.
    #[serde(default = "default_issue_severity")]
    pub severity: String,
}

fn default_issue_severity() -> String {
    "info".to_string()
}

/// Per-field confidence in the verification result.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Confidence {
    pub overall: ConfidenceLevel,
    pub specs: ConfidenceLevel,
    pub math: ConfidenceLevel,
    pub range: ConfidenceLevel,
}

/// A structured error explaining why verification could not produce a
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub suggested_action: String,
}

impl VerificationError {
    pub fn no_connector() -> Self {
        Self {
            error_type: "no_connector".to_string(),
            message: "External model not configured".to_string(),
            suggested_action: "Answer with available data and note uncertainty".to_string(),
        }
    }

    pub fn parse_error() -> Self {
        Self {
            error_type: "parse_error".to_string(),
            message: "Specialist returned invalid JSON".to_string(),
            suggested_action: "Use available data with uncertainty note".to_string(),
        }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self {
            error_type: "exception".to_string(),
            message: message.into(),
            suggested_action: "Answer with available data and note uncertainty".to_string(),
        }
    }

    pub fn cost_blocked() -> Self {
        Self {
            error_type: "cost_blocked".to_string(),
            message: "Session cost hard cap reached; external specialist calls are denied"
                .to_string(),
            suggested_action: "Answer with locally available information and note the limit"
                .to_string(),
        }
    }
}

/// Output of the Specialist Verifier. When `error` is present, the other
/// fields carry their defaults rather than partial data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified_specs: Option<VerifiedSpecs>,
    pub pack_calculation: Option<PackCalculation>,
    pub range_estimate: Option<RangeEstimate>,
    pub issues: Vec<Issue>,
    pub confidence: Confidence,
    pub error: Option<VerificationError>,
}

impl VerificationResult {
    pub fn with_error(error: VerificationError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
