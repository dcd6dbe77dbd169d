//! TokenGuard Core - Design Token Validator
//!
//! # Guarantees
//! 1. Resolution Is Total Or Fails (no partial value maps)
//! 2. Cycles Are Errors In Aliases, Data In Orders
//! 3. Commits Re-check Only What Could Have Changed
//! 4. Plugins Report, Never Throw
//! 5. Expressions Are Bounded

pub mod color;
pub mod config;
pub mod deps;
pub mod emit;
pub mod engine;
pub mod expr;
pub mod hashing;
pub mod pipeline;
pub mod plugins;
pub mod poset;
pub mod sources;
pub mod tokens;
pub mod units;
pub mod validation;

pub use config::{ConfigError, OrderEntry, RuleSet};
pub use engine::{CommitResult, ConstraintEngine};
pub use expr::{evaluate, EvalError, EvalLimits, Evaluator, Expr};
pub use hashing::{canonical_json, snapshot_hash};
pub use pipeline::{CommitReport, HasseView, PipelineError, ValidationPipeline, ValidationReport};
pub use poset::{Digraph, OrderTriple, Relation, RenderOptions};
pub use sources::{apply_overrides, load_tree, SourceError};
pub use tokens::{flatten, FlatToken, ResolveError, Resolution, TokenId, TokenValue};
pub use validation::{ConstraintIssue, ConstraintPlugin, IssueLevel, TokenView};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
