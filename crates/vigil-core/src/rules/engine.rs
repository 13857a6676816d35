//! Rule evaluation engine: first-match-wins, fail-closed.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{
    CategoryId, CheckDefinition, CheckId, EvaluatedResult, EvaluationStatus, Issue, RawResult,
    RawStatus, Severity,
};

use super::error::RuleEvaluationError;

/// Category assigned to results whose check id matches no definition.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Turns raw results into evaluated results.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one raw result against its definition.
    ///
    /// Rules are checked in order and the first match decides. If no rule
    /// matches, a result that did not complete fails with a critical issue and
    /// a completed one passes. A rule that cannot be evaluated fails closed.
    /// A fan-out probe with no findings passes without consulting the rules.
    pub fn evaluate(&self, raw: &RawResult, def: &CheckDefinition) -> EvaluatedResult {
        if raw.is_empty_fan_out() {
            debug!(check_id = %def.id, "fan-out probe reported no findings");
            return EvaluatedResult::for_definition(raw, def, EvaluationStatus::Pass);
        }

        for (index, rule) in def.rules.iter().enumerate() {
            let matched = match rule.condition.eval(raw) {
                Ok(matched) => matched,
                Err(e) => return fail_closed(raw, def, index, e),
            };
            if !matched {
                continue;
            }

            let issue = match rule.issue.as_ref().map(|t| t.instantiate(raw, def)).transpose() {
                Ok(issue) => issue,
                Err(e) => return fail_closed(raw, def, index, e),
            };

            debug!(check_id = %def.id, rule = index, status = %rule.status, "rule matched");
            let mut result = EvaluatedResult::for_definition(raw, def, rule.status);
            result.matched_rule = Some(index);
            result.issues.extend(issue);
            return result;
        }

        default_policy(raw, def)
    }

    /// Evaluate a batch, correlating by check id.
    ///
    /// A raw result with no matching definition fails with a critical
    /// "unknown check" issue. Output order follows `raws`.
    pub fn evaluate_batch(
        &self,
        raws: &[RawResult],
        definitions: &[Arc<CheckDefinition>],
    ) -> Vec<EvaluatedResult> {
        let index: HashMap<&CheckId, &CheckDefinition> = definitions
            .iter()
            .map(|d| (&d.id, d.as_ref()))
            .collect();

        raws.iter()
            .map(|raw| match index.get(&raw.check_id) {
                Some(def) => self.evaluate(raw, def),
                None => unknown_check(raw),
            })
            .collect()
    }
}

fn default_policy(raw: &RawResult, def: &CheckDefinition) -> EvaluatedResult {
    match raw.status {
        RawStatus::Completed => EvaluatedResult::for_definition(raw, def, EvaluationStatus::Pass),
        status => {
            let mut result = EvaluatedResult::for_definition(raw, def, EvaluationStatus::Fail);
            result.issues.push(execution_issue(raw, def, status));
            result
        }
    }
}

fn execution_issue(raw: &RawResult, def: &CheckDefinition, status: RawStatus) -> Issue {
    let (title, verb) = match status {
        RawStatus::TimedOut => ("check timed out", "timed out"),
        _ => ("check execution failed", "failed"),
    };
    Issue {
        check_id: def.id.clone(),
        category: def.category.clone(),
        severity: Severity::Critical,
        title: title.to_string(),
        description: format!("check {} {} before producing a result", def.id, verb),
        affected_object: def.id.to_string(),
        evidence: raw.error_message.clone(),
    }
}

fn fail_closed(
    raw: &RawResult,
    def: &CheckDefinition,
    rule: usize,
    error: RuleEvaluationError,
) -> EvaluatedResult {
    warn!(check_id = %def.id, rule, error = %error, "rule evaluation failed");

    if !raw.is_completed() {
        let mut result = default_policy(raw, def);
        result.evaluation_error = Some(error.to_string());
        return result;
    }

    let mut result = EvaluatedResult::for_definition(raw, def, EvaluationStatus::Fail);
    result.matched_rule = Some(rule);
    result.evaluation_error = Some(error.to_string());
    result.issues.push(Issue {
        check_id: def.id.clone(),
        category: def.category.clone(),
        severity: Severity::Critical,
        title: "rule evaluation failed".to_string(),
        description: format!("rule {rule} of check {} could not be evaluated: {error}", def.id),
        affected_object: def.id.to_string(),
        evidence: None,
    });
    result
}

fn unknown_check(raw: &RawResult) -> EvaluatedResult {
    warn!(check_id = %raw.check_id, "result for unknown check");
    let category = CategoryId::from(UNKNOWN_CATEGORY);
    let mut result = EvaluatedResult::skeleton(
        raw,
        raw.check_id.to_string(),
        category.clone(),
        EvaluationStatus::Fail,
    );
    result.issues.push(Issue {
        check_id: raw.check_id.clone(),
        category,
        severity: Severity::Critical,
        title: "unknown check".to_string(),
        description: format!("no definition is loaded for check {}", raw.check_id),
        affected_object: raw.check_id.to_string(),
        evidence: None,
    });
    result
}
