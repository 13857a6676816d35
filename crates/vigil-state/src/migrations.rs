//! SurrealDB schema migrations and initialization
//!
//! Defines every Vigil table with its indexes. Safe to call on every
//! connection (DEFINE statements are idempotent).

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Vigil tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Vigil SurrealDB schema");

    init_runs_table(db).await?;
    init_check_results_table(db).await?;
    init_issues_table(db).await?;
    init_category_scores_table(db).await?;

    info!("Vigil schema initialization complete");
    Ok(())
}

/// Initialize `runs` table
///
/// Schema:
/// ```text
/// TABLE runs {
///   run_id:              STRING (unique)
///   status:              STRING (completed | failed)
///   started_at:          DATETIME (indexed)
///   finished_at:         DATETIME
///   overall_score:       INT?
///   definitions_digest:  STRING? (indexed)
///   summary:             OBJECT
/// }
/// ```
///
/// Runs are written once; rows are never updated.
async fn init_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing runs table");

    let sql = r#"
        DEFINE TABLE runs AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_run_id ON TABLE runs COLUMNS run_id UNIQUE;
        DEFINE INDEX idx_started_at ON TABLE runs COLUMNS started_at;
        DEFINE INDEX idx_definitions_digest ON TABLE runs COLUMNS definitions_digest;
        DEFINE INDEX idx_status ON TABLE runs COLUMNS status;
    "#;

    db.query(sql).await?;
    info!("✓ runs table initialized");
    Ok(())
}

/// Initialize `check_results` table
///
/// `(run_id, seq)` is unique; `seq` preserves the engine's result order.
async fn init_check_results_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing check_results table");

    let sql = r#"
        DEFINE TABLE check_results AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_results_run_seq ON TABLE check_results COLUMNS run_id, seq UNIQUE;
        DEFINE INDEX idx_results_check_id ON TABLE check_results COLUMNS check_id;
        DEFINE INDEX idx_results_category ON TABLE check_results COLUMNS category;
    "#;

    db.query(sql).await?;
    info!("✓ check_results table initialized");
    Ok(())
}

/// Initialize `issues` table
async fn init_issues_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing issues table");

    let sql = r#"
        DEFINE TABLE issues AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_issues_run_seq ON TABLE issues COLUMNS run_id, seq UNIQUE;
        DEFINE INDEX idx_issues_severity ON TABLE issues COLUMNS severity;
        DEFINE INDEX idx_issues_check_id ON TABLE issues COLUMNS check_id;
    "#;

    db.query(sql).await?;
    info!("✓ issues table initialized");
    Ok(())
}

/// Initialize `category_scores` table
async fn init_category_scores_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing category_scores table");

    let sql = r#"
        DEFINE TABLE category_scores AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_scores_run_seq ON TABLE category_scores COLUMNS run_id, seq UNIQUE;
        DEFINE INDEX idx_scores_category ON TABLE category_scores COLUMNS category;
    "#;

    db.query(sql).await?;
    info!("✓ category_scores table initialized");
    Ok(())
}
