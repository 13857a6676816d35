//! Classified issues and per-severity tallies.

use serde::{Deserialize, Serialize};

use crate::domain::check::{CategoryId, CheckId, Severity};

/// One problem found by a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub check_id: CheckId,
    pub category: CategoryId,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub affected_object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Issue counts by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl IssueCounts {
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let mut counts = Self::default();
        for issue in issues {
            counts.add(issue.severity);
        }
        counts
    }

    pub fn add(&mut self, severity: Severity) {
        let slot = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn get(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn total(&self) -> u32 {
        Severity::ALL
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(self.get(*s)))
    }

    /// Number of issues at `threshold` or more severe.
    pub fn at_or_above(&self, threshold: Severity) -> u32 {
        Severity::ALL
            .iter()
            .filter(|s| **s >= threshold)
            .fold(0u32, |acc, s| acc.saturating_add(self.get(*s)))
    }

    pub fn merge(&mut self, other: &IssueCounts) {
        self.critical = self.critical.saturating_add(other.critical);
        self.high = self.high.saturating_add(other.high);
        self.medium = self.medium.saturating_add(other.medium);
        self.low = self.low.saturating_add(other.low);
    }
}
