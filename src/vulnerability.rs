use crate::VoucherError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Impact classification of a vulnerability.
///
/// Ordering follows the declaration order below, so `Unknown` sits between
/// `Medium` and `High`. A `Medium` threshold therefore includes unknown
/// vulnerabilities while a `High` threshold excludes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Negligible,
    Low,
    Medium,
    Unknown,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Severity::Negligible,
        Severity::Low,
        Severity::Medium,
        Severity::Unknown,
        Severity::High,
        Severity::Critical,
    ];

    /// Integer rank used for comparisons.
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Negligible => "negligible",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::Unknown => "unknown",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = VoucherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        // Backends prefix their enum values (e.g. SEVERITY_HIGH).
        let name = lowered.strip_prefix("severity_").unwrap_or(&lowered);
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str() == name)
            .ok_or_else(|| VoucherError::Config(format!("unknown severity \"{}\"", s)))
    }
}

/// A vulnerability in the canonical shape every backend maps into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub name: String,
    pub description: String,
    #[serde(rename = "fixedBy")]
    pub fixed_by: String,
    pub severity: Severity,
}

/// Whether a vulnerability is at or above the failure threshold.
pub fn should_include(vulnerability: &Vulnerability, threshold: Severity) -> bool {
    vulnerability.severity >= threshold
}

/// Keep only the vulnerabilities at or above the failure threshold.
pub fn filter_vulnerabilities(
    vulnerabilities: Vec<Vulnerability>,
    threshold: Severity,
) -> Vec<Vulnerability> {
    vulnerabilities
        .into_iter()
        .filter(|v| should_include(v, threshold))
        .collect()
}
