//! Health scoring: severity-weighted deductions per category, rolled up into
//! a category-weighted overall score.
//!
//! Scoring is a pure function of the evaluated results and the config.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{CategoryId, EvaluatedResult, IssueCounts, Severity};
use crate::error::ConfigError;

/// Points deducted per issue of each severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 10,
            high: 5,
            medium: 2,
            low: 1,
        }
    }
}

impl SeverityWeights {
    pub fn get(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    /// Total deduction for `counts`, saturating.
    pub fn deduction(&self, counts: &IssueCounts) -> u32 {
        Severity::ALL.iter().fold(0u32, |acc, s| {
            acc.saturating_add(counts.get(*s).saturating_mul(self.get(*s)))
        })
    }
}

/// Scoring configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub severity_weights: SeverityWeights,
    /// Relative weight of each category in the overall score. Categories not
    /// listed weigh 1.
    pub category_weights: BTreeMap<CategoryId, f64>,
}

impl ScoringConfig {
    pub fn with_category_weight(mut self, category: impl Into<String>, weight: f64) -> Self {
        self.category_weights
            .insert(CategoryId(category.into()), weight);
        self
    }

    /// Reject category weights that are non-finite or not positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (category, weight) in &self.category_weights {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "category weight for {category} must be a positive finite number, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Score of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: CategoryId,
    /// 0..=100
    pub value: u32,
    pub checks_executed: u32,
    pub checks_passed: u32,
    pub issue_counts: IssueCounts,
    pub weight: f64,
    pub deduction: u32,
    /// `value * weight / total_weight`; these sum to the unrounded overall.
    pub weighted_contribution: f64,
}

/// Scores of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// 0..=100
    pub overall: u32,
    /// Sorted by category id.
    pub categories: Vec<CategoryScore>,
    /// Categories scored with the default weight of 1.
    pub defaulted_categories: Vec<CategoryId>,
}

impl ScoreReport {
    pub fn category(&self, category: &str) -> Option<&CategoryScore> {
        self.categories
            .iter()
            .find(|c| c.category.as_str() == category)
    }
}

#[derive(Default)]
struct Tally {
    executed: u32,
    passed: u32,
    issues: IssueCounts,
}

/// Computes [`ScoreReport`]s.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score evaluated results. No results scores 100 with no categories.
    pub fn score(&self, results: &[EvaluatedResult]) -> ScoreReport {
        let mut tallies: BTreeMap<&CategoryId, Tally> = BTreeMap::new();
        for result in results {
            let tally = tallies.entry(&result.category).or_default();
            tally.executed = tally.executed.saturating_add(1);
            if result.is_pass() {
                tally.passed = tally.passed.saturating_add(1);
            }
            tally
                .issues
                .merge(&IssueCounts::from_issues(&result.issues));
        }

        let mut defaulted_categories = Vec::new();
        let mut categories: Vec<CategoryScore> = tallies
            .into_iter()
            .map(|(category, tally)| {
                let weight = match self.config.category_weights.get(category) {
                    Some(w) => *w,
                    None => {
                        warn!(category = %category, "no weight configured for category, using 1");
                        defaulted_categories.push(category.clone());
                        1.0
                    }
                };
                let deduction = self.config.severity_weights.deduction(&tally.issues);
                CategoryScore {
                    category: category.clone(),
                    value: 100u32.saturating_sub(deduction),
                    checks_executed: tally.executed,
                    checks_passed: tally.passed,
                    issue_counts: tally.issues,
                    weight,
                    deduction,
                    weighted_contribution: 0.0,
                }
            })
            .collect();

        let total_weight: f64 = categories.iter().map(|c| c.weight).sum();
        let overall = if categories.is_empty() || total_weight <= 0.0 {
            100
        } else {
            for c in &mut categories {
                c.weighted_contribution = f64::from(c.value) * c.weight / total_weight;
            }
            let weighted: f64 = categories.iter().map(|c| f64::from(c.value) * c.weight).sum();
            round_half_up(weighted / total_weight)
        };

        ScoreReport {
            overall,
            categories,
            defaulted_categories,
        }
    }
}

/// Slack for weighted averages that land a rounding error below a half.
const HALF_TOLERANCE: f64 = 1e-9;

/// Round a score to the nearest integer, halves up, clamped to 0..=100.
///
/// Values within [`HALF_TOLERANCE`] below a half count as the half.
pub fn round_half_up(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    (value + 0.5 + HALF_TOLERANCE).floor().clamp(0.0, 100.0) as u32
}
