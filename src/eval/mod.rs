//! Evaluation of the fragment language.
//!
//! Mirrors the parse pipeline from the other side: a parsed [`crate::ast`]
//! tree is walked by the statement and expression evaluators against an
//! [`context::ExecutionContext`], which carries the process-wide shared
//! namespace, the evaluation-local scope stack, capability-bound functions,
//! and the handler registry.

pub mod context;
pub mod evaluator;
pub mod expression;
pub mod statement;

pub use evaluator::{EvalError, EvalResult, Evaluator};
pub use expression::Value;
