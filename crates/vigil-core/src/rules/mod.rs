//! Declarative rule engine.
//!
//! Definitions carry an ordered rule set; each rule pairs a typed condition
//! with a resulting status and an optional issue template. Everything that
//! can be checked statically is checked when definitions load.

pub mod condition;
pub mod engine;
pub mod error;
pub mod loader;
pub mod rule;
pub mod template;

pub use condition::{Condition, ConditionSpec, NumOp};
pub use engine::{Evaluator, UNKNOWN_CATEGORY};
pub use error::{RuleEvaluationError, RuleLoadError};
pub use loader::{
    compile_definitions, definitions_digest, ensure_unique, load_definitions, parse_definitions,
    DefinitionDoc,
};
pub use rule::{IssueTemplate, IssueTemplateSpec, Rule, RuleSet, RuleSpec};
pub use template::Template;
