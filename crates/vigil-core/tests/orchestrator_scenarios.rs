//! End-to-end runs through the orchestrator with in-process plugins.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use vigil_core::domain::run::{EXIT_ISSUES, EXIT_OK, EXIT_RUN_FAILED};
use vigil_core::rules::load_definitions;
use vigil_core::{
    ArtifactReporter, CheckPlugin, DiscoveryError, EngineConfig, EvaluationStatus,
    ExecutionContext, Invocation, Orchestrator, PluginError, PluginOutput, PluginRegistry,
    RawStatus, RunId, RunStatus, Severity, StaticDefinitionSource, StaticDiscovery,
};
use vigil_core::{CheckDefinition, DefinitionFilter, DefinitionSource, Discovery};
use vigil_state::fakes::{FailingRunStore, MemoryRunStore};
use vigil_state::{
    CategoryScoreRecord, CheckResultRecord, IssueRecord, RunRecord, RunStore, StorageResult,
};

/// Reports its `params` document as its output.
struct Fixed;

#[async_trait]
impl CheckPlugin for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn invoke(&self, inv: &Invocation) -> Result<PluginOutput, PluginError> {
        PluginOutput::from_json(inv.params().clone())
    }
}

struct Hang;

#[async_trait]
impl CheckPlugin for Hang {
    fn name(&self) -> &str {
        "hang"
    }

    async fn invoke(&self, _inv: &Invocation) -> Result<PluginOutput, PluginError> {
        std::future::pending::<()>().await;
        Ok(PluginOutput::new())
    }
}

struct Unreachable;

#[async_trait]
impl Discovery for Unreachable {
    async fn discover(&self, _run_id: &RunId) -> Result<ExecutionContext, DiscoveryError> {
        Err(DiscoveryError::Unavailable("inventory api down".to_string()))
    }
}

/// Discovery with a bug in it.
struct Exploding;

#[async_trait]
impl Discovery for Exploding {
    async fn discover(&self, _run_id: &RunId) -> Result<ExecutionContext, DiscoveryError> {
        panic!("inventory parser bug");
    }
}

/// Panics on the first write, answers reads with nothing.
struct BrokenStore;

#[async_trait]
impl RunStore for BrokenStore {
    async fn save_run(&self, _run: RunRecord) -> StorageResult<()> {
        panic!("driver exploded");
    }

    async fn save_results(
        &self,
        _run_id: &RunId,
        _results: Vec<CheckResultRecord>,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn save_issues(&self, _run_id: &RunId, _issues: Vec<IssueRecord>) -> StorageResult<()> {
        Ok(())
    }

    async fn save_scores(
        &self,
        _run_id: &RunId,
        _scores: Vec<CategoryScoreRecord>,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        Err(vigil_state::StorageError::RunNotFound {
            run_id: run_id.to_string(),
        })
    }

    async fn list_runs(&self, _limit: Option<usize>) -> StorageResult<Vec<RunRecord>> {
        Ok(Vec::new())
    }

    async fn get_results(&self, _run_id: &RunId) -> StorageResult<Vec<CheckResultRecord>> {
        Ok(Vec::new())
    }

    async fn get_issues(&self, _run_id: &RunId) -> StorageResult<Vec<IssueRecord>> {
        Ok(Vec::new())
    }

    async fn get_scores(&self, _run_id: &RunId) -> StorageResult<Vec<CategoryScoreRecord>> {
        Ok(Vec::new())
    }
}

fn registry() -> PluginRegistry {
    PluginRegistry::new()
        .with_plugin(Arc::new(Fixed))
        .with_plugin(Arc::new(Hang))
}

fn disk(used_pct: f64) -> serde_json::Value {
    json!({
        "check_id": "disk_usage",
        "category": "capacity",
        "severity": "high",
        "plugin": "fixed",
        "params": {"used_pct": used_pct, "mount": "/var"},
        "fields": {"used_pct": "float", "mount": "text"},
        "rules": [
            {"when": {"op": "gte", "field": "used_pct", "value": 95},
             "status": "fail",
             "issue": {"severity": "critical", "title": "Disk nearly full",
                       "description": "{mount} is {used_pct}% full",
                       "affected_object": "{mount}"}},
            {"when": {"op": "gte", "field": "used_pct", "value": 80},
             "status": "warning",
             "issue": {"title": "Disk filling up", "description": "{mount}",
                       "affected_object": "{mount}"}}
        ]
    })
}

fn ssh(root_login: bool) -> serde_json::Value {
    json!({
        "check_id": "ssh_root_login",
        "category": "security",
        "severity": "high",
        "plugin": "fixed",
        "params": {"permit_root_login": root_login},
        "fields": {"permit_root_login": "bool"},
        "rules": [
            {"when": {"op": "eq", "field": "permit_root_login", "value": true},
             "status": "fail",
             "issue": {"title": "Root login permitted", "description": "sshd allows root",
                       "affected_object": "sshd"}}
        ]
    })
}

fn backup(age_hours: i64) -> serde_json::Value {
    json!({
        "check_id": "backup_age",
        "category": "backup",
        "severity": "medium",
        "plugin": "fixed",
        "params": {"age_hours": age_hours},
        "fields": {"age_hours": "int"},
        "rules": [
            {"when": {"op": "gt", "field": "age_hours", "value": 24},
             "status": "fail",
             "issue": {"title": "Backup is stale", "description": "last backup {age_hours}h ago",
                       "affected_object": "backups"}}
        ]
    })
}

fn definitions(docs: Vec<serde_json::Value>) -> Vec<CheckDefinition> {
    load_definitions("test", &serde_json::Value::Array(docs).to_string())
        .unwrap()
        .into_iter()
        .map(|d| d.as_ref().clone())
        .collect()
}

fn orchestrator(config: EngineConfig, docs: Vec<serde_json::Value>) -> Orchestrator {
    Orchestrator::new(
        config,
        Arc::new(StaticDiscovery::target("cluster-a")),
        Arc::new(StaticDefinitionSource::new(definitions(docs))),
        registry(),
    )
}

#[tokio::test]
async fn clean_run_scores_100() {
    let store = Arc::new(MemoryRunStore::new());
    let orch = orchestrator(
        EngineConfig::default(),
        vec![disk(40.0), ssh(false), backup(3)],
    )
    .with_store(Arc::clone(&store) as Arc<dyn RunStore>);

    let outcome = orch.run(&CancellationToken::new()).await;

    assert!(outcome.is_completed());
    let summary = &outcome.summary;
    assert_eq!(summary.overall_score, Some(100));
    assert_eq!(summary.checks_scheduled, 3);
    assert_eq!(summary.status_counts.pass, 3);
    assert_eq!(summary.issue_counts.total(), 0);
    assert_eq!(summary.target.as_deref(), Some("cluster-a"));
    assert!(summary.warnings.is_empty());
    assert_eq!(summary.definitions_digest.as_ref().map(String::len), Some(64));
    assert_eq!(summary.exit_code(Severity::Low), EXIT_OK);

    let saved = store.get_run(&summary.run_id).await.unwrap();
    assert_eq!(saved.status, RunStatus::Completed);
    assert_eq!(saved.overall_score, Some(100));
    assert_eq!(store.get_results(&summary.run_id).await.unwrap().len(), 3);
    assert_eq!(store.get_scores(&summary.run_id).await.unwrap().len(), 3);
    assert_eq!(orch.metrics().runs_finished(), 1);
}

#[tokio::test]
async fn issues_lower_category_and_overall_scores() {
    let orch = orchestrator(EngineConfig::default(), vec![disk(97.0), ssh(true)]);
    let outcome = orch.run(&CancellationToken::new()).await;
    let scores = outcome.scores.as_ref().unwrap();

    // critical (10) in capacity, high (5) in security
    assert_eq!(scores.category("capacity").unwrap().value, 90);
    assert_eq!(scores.category("security").unwrap().value, 95);
    assert_eq!(scores.overall, 93);

    let summary = &outcome.summary;
    assert_eq!(summary.status_counts.fail, 2);
    assert_eq!(summary.issue_counts.critical, 1);
    assert_eq!(summary.issue_counts.high, 1);
    assert_eq!(summary.exit_code(Severity::Critical), EXIT_ISSUES);

    let disk = outcome
        .results
        .iter()
        .find(|r| r.check_id.as_str() == "disk_usage")
        .unwrap();
    assert_eq!(disk.matched_rule, Some(0));
    assert_eq!(disk.issues[0].affected_object, "/var");
}

#[tokio::test]
async fn category_weights_shape_the_overall_score() {
    let mut config = EngineConfig::default();
    config.scoring = config
        .scoring
        .with_category_weight("capacity", 3.0)
        .with_category_weight("security", 1.0);

    let outcome = orchestrator(config, vec![disk(97.0), ssh(false)])
        .run(&CancellationToken::new())
        .await;

    // (90 * 3 + 100 * 1) / 4 = 92.5
    assert_eq!(outcome.summary.overall_score, Some(93));
    assert!(outcome.scores.unwrap().defaulted_categories.is_empty());
    assert!(outcome.summary.warnings.is_empty());
}

#[tokio::test]
async fn unweighted_category_still_counts_toward_the_overall_score() {
    let mut config = EngineConfig::default();
    config.scoring = config.scoring.with_category_weight("capacity", 3.0);

    let outcome = orchestrator(config, vec![disk(97.0), ssh(true)])
        .run(&CancellationToken::new())
        .await;

    // (90 * 3 + 95 * 1) / 4 = 91.25
    assert_eq!(outcome.summary.overall_score, Some(91));
    let scores = outcome.scores.as_ref().unwrap();
    assert_eq!(scores.category("security").unwrap().weight, 1.0);
    assert_eq!(scores.defaulted_categories.len(), 1);
    assert_eq!(
        outcome.summary.warnings,
        vec!["category security scored with default weight 1".to_string()]
    );
}

#[tokio::test]
async fn category_filter_limits_the_run() {
    let mut config = EngineConfig::default();
    config.categories = vec!["security".into()];

    let outcome = orchestrator(config, vec![disk(97.0), ssh(false)])
        .run(&CancellationToken::new())
        .await;

    assert_eq!(outcome.summary.checks_scheduled, 1);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].check_id.as_str(), "ssh_root_login");
    assert_eq!(outcome.summary.overall_score, Some(100));
}

#[tokio::test]
async fn discovery_failure_fails_the_run_without_scores() {
    let store = Arc::new(MemoryRunStore::new());
    let orch = Orchestrator::new(
        EngineConfig::default(),
        Arc::new(Unreachable),
        Arc::new(StaticDefinitionSource::new(definitions(vec![disk(10.0)]))),
        registry(),
    )
    .with_store(Arc::clone(&store) as Arc<dyn RunStore>);

    let outcome = orch.run(&CancellationToken::new()).await;

    assert_eq!(outcome.summary.status, RunStatus::Failed);
    assert!(outcome.scores.is_none());
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.summary.overall_score, None);
    assert_eq!(
        outcome.summary.failure_reason.as_deref(),
        Some("discovery failed: discovery unavailable: inventory api down")
    );
    assert_eq!(outcome.summary.exit_code(Severity::Critical), EXIT_RUN_FAILED);

    let saved = store.get_run(&outcome.summary.run_id).await.unwrap();
    assert_eq!(saved.status, RunStatus::Failed);
    assert_eq!(saved.overall_score, None);
}

#[tokio::test]
async fn duplicate_definitions_fail_the_run() {
    struct Duplicates;

    #[async_trait]
    impl DefinitionSource for Duplicates {
        async fn load(
            &self,
            filter: &DefinitionFilter,
        ) -> Result<Vec<Arc<CheckDefinition>>, vigil_core::DefinitionError> {
            let defs = definitions(vec![disk(1.0)]);
            StaticDefinitionSource::new(vec![defs[0].clone(), defs[0].clone()])
                .load(filter)
                .await
        }
    }

    let orch = Orchestrator::new(
        EngineConfig::default(),
        Arc::new(StaticDiscovery::target("cluster-a")),
        Arc::new(Duplicates),
        registry(),
    );
    let outcome = orch.run(&CancellationToken::new()).await;

    assert_eq!(outcome.summary.status, RunStatus::Failed);
    assert!(outcome
        .summary
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("definition loading failed"));
}

#[tokio::test]
async fn invalid_config_fails_the_run() {
    let mut config = EngineConfig::default();
    config.max_parallel = 0;
    let outcome = orchestrator(config, vec![disk(1.0)])
        .run(&CancellationToken::new())
        .await;

    assert_eq!(outcome.summary.status, RunStatus::Failed);
    assert!(outcome.scores.is_none());
}

#[tokio::test]
async fn persistence_failure_is_a_warning() {
    let orch = orchestrator(EngineConfig::default(), vec![disk(40.0)])
        .with_store(Arc::new(FailingRunStore::new("connection refused")));

    let outcome = orch.run(&CancellationToken::new()).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.summary.overall_score, Some(100));
    assert_eq!(outcome.summary.warnings.len(), 1);
    assert!(outcome.summary.warnings[0].contains("connection refused"));
}

#[tokio::test]
async fn child_row_failures_leave_the_run_completed() {
    let store = Arc::new(FailingRunStore::child_rows("table locked"));
    let orch = orchestrator(EngineConfig::default(), vec![disk(97.0)])
        .with_store(Arc::clone(&store) as Arc<dyn RunStore>);

    let outcome = orch.run(&CancellationToken::new()).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.summary.overall_score, Some(90));
    let warnings = &outcome.summary.warnings;
    assert_eq!(warnings.len(), 3);
    assert!(warnings[0].starts_with("failed to persist results"));
    assert!(warnings[1].starts_with("failed to persist issues"));
    assert!(warnings[2].starts_with("failed to persist scores"));

    let saved = store.get_run(&outcome.summary.run_id).await.unwrap();
    assert_eq!(saved.status, RunStatus::Completed);
}

#[tokio::test]
async fn findings_fan_out_into_separate_results() {
    let doc = json!({
        "check_id": "table_bloat",
        "category": "data",
        "severity": "medium",
        "plugin": "fixed",
        "params": {
            "database": "orders_db",
            "findings": [
                {"table": "orders", "rows": 5000},
                {"table": "users", "rows": 20},
                {"table": "events", "rows": 900}
            ]
        },
        "fields": {"database": "text", "table": "text", "rows": "int"},
        "rules": [
            {"when": {"op": "gt", "field": "rows", "value": 100},
             "status": "fail",
             "issue": {"title": "Table too large",
                       "description": "{database}.{table} has {rows} rows",
                       "affected_object": "{database}.{table}"}}
        ]
    });

    let outcome = orchestrator(EngineConfig::default(), vec![doc])
        .run(&CancellationToken::new())
        .await;

    assert_eq!(outcome.summary.checks_scheduled, 1);
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.summary.status_counts.fail, 2);
    assert_eq!(outcome.summary.status_counts.pass, 1);

    let mut affected: Vec<&str> = outcome
        .results
        .iter()
        .flat_map(|r| r.issues.iter())
        .map(|i| i.affected_object.as_str())
        .collect();
    affected.sort_unstable();
    assert_eq!(affected, vec!["orders_db.events", "orders_db.orders"]);

    // two medium issues at weight 2
    assert_eq!(outcome.summary.overall_score, Some(96));
}

#[tokio::test]
async fn fan_out_with_no_findings_passes() {
    let fields = json!({"domain": "text", "account": "text", "stale_days": "int"});
    let rules = json!([
        {"when": {"op": "gt", "field": "stale_days", "value": 90},
         "status": "fail",
         "issue": {"title": "Stale account", "description": "{account} idle {stale_days} days",
                   "affected_object": "{account}"}}
    ]);
    let nested = json!({
        "check_id": "stale_accounts",
        "category": "identity",
        "severity": "high",
        "plugin": "fixed",
        "params": {"domain": "corp", "findings": []},
        "fields": fields,
        "rules": rules
    });
    let top_level = json!({
        "check_id": "stale_service_accounts",
        "category": "identity",
        "severity": "high",
        "plugin": "fixed",
        "params": [],
        "fields": fields,
        "rules": rules
    });

    let outcome = orchestrator(EngineConfig::default(), vec![nested, top_level])
        .run(&CancellationToken::new())
        .await;

    assert_eq!(outcome.results.len(), 2);
    for result in &outcome.results {
        assert_eq!(result.status, EvaluationStatus::Pass, "{}", result.check_id);
        assert!(result.issues.is_empty());
        assert!(result.evaluation_error.is_none());
    }
    assert_eq!(outcome.summary.overall_score, Some(100));
}

#[tokio::test]
async fn panicking_discovery_fails_the_run() {
    let store = Arc::new(MemoryRunStore::new());
    let orch = Orchestrator::new(
        EngineConfig::default(),
        Arc::new(Exploding),
        Arc::new(StaticDefinitionSource::new(definitions(vec![disk(10.0)]))),
        registry(),
    )
    .with_store(Arc::clone(&store) as Arc<dyn RunStore>);

    let outcome = orch.run(&CancellationToken::new()).await;

    assert_eq!(outcome.summary.status, RunStatus::Failed);
    assert!(outcome.scores.is_none());
    assert_eq!(
        outcome.summary.failure_reason.as_deref(),
        Some("run panicked: inventory parser bug")
    );
    assert_eq!(outcome.summary.exit_code(Severity::Critical), EXIT_RUN_FAILED);

    let saved = store.get_run(&outcome.summary.run_id).await.unwrap();
    assert_eq!(saved.status, RunStatus::Failed);
}

#[tokio::test]
async fn panicking_store_keeps_the_completed_run() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(EngineConfig::default(), vec![disk(40.0)])
        .with_store(Arc::new(BrokenStore))
        .with_reporter(Arc::new(ArtifactReporter::new(dir.path())));

    let outcome = orch.run(&CancellationToken::new()).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.summary.overall_score, Some(100));
    assert_eq!(
        outcome.summary.warnings,
        vec!["run store panicked: driver exploded".to_string()]
    );
    assert!(dir.path().join("run_summary.json").exists());
    assert_eq!(orch.metrics().runs_finished(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_plugin_times_out_into_a_critical_issue() {
    let mut config = EngineConfig::default();
    config.timeout_secs = 1;
    let hang = json!({
        "check_id": "backup_age",
        "category": "backup",
        "severity": "low",
        "plugin": "hang"
    });

    let outcome = orchestrator(config, vec![hang]).run(&CancellationToken::new()).await;

    assert!(outcome.is_completed());
    let result = &outcome.results[0];
    assert_eq!(result.raw_status, RawStatus::TimedOut);
    assert_eq!(result.status, EvaluationStatus::Fail);
    assert_eq!(result.issues[0].severity, Severity::Critical);
    assert_eq!(result.issues[0].title, "check timed out");
    assert_eq!(outcome.summary.overall_score, Some(90));
}

#[tokio::test]
async fn reporter_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(EngineConfig::default(), vec![disk(85.0)])
        .with_reporter(Arc::new(ArtifactReporter::new(dir.path())));

    let outcome = orch.run(&CancellationToken::new()).await;
    assert_eq!(outcome.summary.status_counts.warning, 1);

    let json = std::fs::read_to_string(dir.path().join("run_summary.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["summary"]["run_id"], outcome.summary.run_id.to_string());
    assert!(dir.path().join("run_summary.md").exists());
}
