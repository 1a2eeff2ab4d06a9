//! Rule AST data structures.
//!
//! This module defines the abstract syntax tree for trading rules:
//! - `CompareOp`: the six comparison operators
//! - `Literal`: right-hand side of a comparison, a number or a signal name
//! - `Rule`: comparisons combined with AND / OR / NOT
//!
//! `Display` renders a canonical, fully parenthesised form that parses back to
//! the same tree.

use std::fmt;

use crate::domain::indicator::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
        CompareOp::Eq,
        CompareOp::Ne,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<CompareOp> {
        CompareOp::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    /// `==` and `!=` are the only operators defined on signals.
    pub fn is_equality(&self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    pub fn compare<T: PartialOrd>(&self, left: T, right: T) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Signal(Signal),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Signal(s) => write!(f, "'{s}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Comparison {
        field: String,
        op: CompareOp,
        literal: Literal,
    },
    And(Box<Rule>, Box<Rule>),
    Or(Box<Rule>, Box<Rule>),
    Not(Box<Rule>),
}

impl Rule {
    pub fn compare(field: &str, op: CompareOp, literal: Literal) -> Rule {
        Rule::Comparison {
            field: field.to_string(),
            op,
            literal,
        }
    }

    pub fn and(left: Rule, right: Rule) -> Rule {
        Rule::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Rule, right: Rule) -> Rule {
        Rule::Or(Box::new(left), Box::new(right))
    }

    pub fn negate(rule: Rule) -> Rule {
        Rule::Not(Box::new(rule))
    }

    /// Fields referenced by the rule, in order of first appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'r>(&'r self, out: &mut Vec<&'r str>) {
        match self {
            Rule::Comparison { field, .. } => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
            Rule::And(left, right) | Rule::Or(left, right) => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Rule::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Number of comparisons in the tree.
    pub fn comparison_count(&self) -> usize {
        match self {
            Rule::Comparison { .. } => 1,
            Rule::And(left, right) | Rule::Or(left, right) => {
                left.comparison_count() + right.comparison_count()
            }
            Rule::Not(inner) => inner.comparison_count(),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Comparison { field, op, literal } => write!(f, "{field} {op} {literal}"),
            Rule::And(left, right) => write!(f, "({left} AND {right})"),
            Rule::Or(left, right) => write!(f, "({left} OR {right})"),
            Rule::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}
