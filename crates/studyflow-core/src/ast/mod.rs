//! Rule DSL syntax tree
//!
//! Study rules are stored as data: a recursive tree of named expressions whose
//! arguments are numbers, strings or nested expressions. The same node type
//! is used for pure expressions (`eq`, `hasParticipantFlagKey`, ...) and for
//! actions (`IF`, `UPDATE_FLAG`, ...); the evaluator decides by name.

pub mod expression;

pub use expression::{Expression, ExpressionArg};
