//! Static rule set validation
//!
//! Walks rule trees without evaluating them and reports every node whose name
//! the engine would reject at runtime. Rule sets can be checked this way before
//! they are stored, instead of failing later for each participant.
//!
//! The top level of a rule set and the nested arguments of `IF`, `DO` and
//! `IFTHEN` are action positions (except the conditions of `IF`/`IFTHEN`);
//! every other nested argument is an expression position.
//!
//! # Example
//!
//! ```rust
//! use studyflow_core::Expression;
//! use studyflow_runtime::validation::validate_rules;
//!
//! let rules = vec![Expression::new("IF")
//!     .exp(Expression::new("checkEventType").str("SUBMIT"))
//!     .exp(Expression::new("UPDATE_FLAG").str("done").str("yes"))];
//! assert!(validate_rules(&rules).is_empty());
//!
//! let broken = vec![Expression::new("IF")
//!     .exp(Expression::new("checkEvent").str("SUBMIT"))
//!     .exp(Expression::new("UPDATE_FLAG").str("done").str("yes"))];
//! let issues = validate_rules(&broken);
//! assert_eq!(issues[0].path, "rules[0].data[0]");
//! ```

use crate::engine::registry::{lookup_action, lookup_expression};
use serde::Serialize;
use std::fmt;
use studyflow_core::{Expression, ExpressionArg};

/// Problem found in a rule tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleIssue {
    /// Location in the rule set, e.g. `rules[2].data[1].data[0]`
    pub path: String,
    /// Name of the offending node
    pub name: String,
    pub problem: String,
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path, self.name, self.problem)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Action,
    Expression,
}

/// Validate a rule set; an empty result means every node resolves
pub fn validate_rules(rules: &[Expression]) -> Vec<RuleIssue> {
    let mut issues = Vec::new();
    for (index, rule) in rules.iter().enumerate() {
        visit(rule, Position::Action, format!("rules[{}]", index), &mut issues);
    }
    issues
}

fn visit(node: &Expression, position: Position, path: String, issues: &mut Vec<RuleIssue>) {
    let mut issue = |problem: String| {
        issues.push(RuleIssue {
            path: path.clone(),
            name: node.name.clone(),
            problem,
        })
    };

    let action_kind = match position {
        Position::Action => match lookup_action(&node.name) {
            Some(kind) => Some(kind),
            None => {
                let problem = if lookup_expression(&node.name).is_some() {
                    "expression used where an action is expected"
                } else {
                    "unknown action"
                };
                issue(problem.to_string());
                return;
            }
        },
        Position::Expression => {
            if lookup_expression(&node.name).is_none() {
                let problem = if lookup_action(&node.name).is_some() {
                    "action used where an expression is expected"
                } else {
                    "unknown expression"
                };
                issue(problem.to_string());
                return;
            }
            None
        }
    };

    for (i, arg) in node.data.iter().enumerate() {
        let arg_path = format!("{}.data[{}]", path, i);
        let child_position = match action_kind {
            Some(kind) if kind.takes_nested_actions() && !kind.condition_args().contains(&i) => {
                Position::Action
            }
            _ => Position::Expression,
        };
        match arg {
            ExpressionArg::Exp(Some(child)) => visit(child, child_position, arg_path, issues),
            ExpressionArg::Exp(None) => issues.push(RuleIssue {
                path: arg_path,
                name: node.name.clone(),
                problem: "nested expression argument is empty".to_string(),
            }),
            ExpressionArg::Num(_) | ExpressionArg::Str(_) => {}
        }
    }
}
