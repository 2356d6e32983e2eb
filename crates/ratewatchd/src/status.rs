//! Load severity levels and threshold classification

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RatewatchError;
use crate::rate::RateSnapshot;

/// Usage ratio at or above which load is CRITICAL
pub const CRITICAL_RATIO: f64 = 1.0;
/// Usage ratio at or above which load is ABNORMAL
pub const ABNORMAL_RATIO: f64 = 0.7;
/// Usage ratio at or above which load is WARNING
pub const WARNING_RATIO: f64 = 0.5;

/// Load severity, ordered by increasing usage
///
/// Serialized in upper case; parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Ok,
    Warning,
    Abnormal,
    Critical,
}

impl Severity {
    /// All severities, lowest first
    pub const ALL: [Severity; 4] = [
        Severity::Ok,
        Severity::Warning,
        Severity::Abnormal,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Abnormal => "ABNORMAL",
            Severity::Critical => "CRITICAL",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RatewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RatewatchError::config(format!("unknown severity '{}'", s)))
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Configured load thresholds; 0 disables a dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub pps: f64,
    pub mbps: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pps: 100_000.0,
            mbps: 1_000.0,
        }
    }
}

/// Fraction of the threshold in use, max over pps and mbps
pub fn usage(rates: &RateSnapshot, thresholds: &Thresholds) -> f64 {
    let ratio = |value: f64, limit: f64| if limit > 0.0 { value / limit } else { 0.0 };
    ratio(rates.pps, thresholds.pps).max(ratio(rates.mbps, thresholds.mbps))
}

/// Maps a rate snapshot onto a severity level
pub fn classify(rates: &RateSnapshot, thresholds: &Thresholds) -> Severity {
    let usage = usage(rates, thresholds);
    if usage >= CRITICAL_RATIO {
        Severity::Critical
    } else if usage >= ABNORMAL_RATIO {
        Severity::Abnormal
    } else if usage >= WARNING_RATIO {
        Severity::Warning
    } else {
        Severity::Ok
    }
}
