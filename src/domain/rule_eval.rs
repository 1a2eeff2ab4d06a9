//! Rule evaluation against an indicator snapshot.
//!
//! # Evaluation Semantics
//!
//! - `AND`: Short-circuits on first `false`
//! - `OR`: Short-circuits on first `true`
//! - Comparisons against a number resolve the field to a numeric value:
//!   `key` is the primary value, `key.sub` a named sub-value, and `key_sub`
//!   the longest snapshot key that prefixes the field followed by a sub-value
//!   (`macd_histogram` reads `histogram` from `macd`).
//! - Comparisons against a quoted signal resolve `key` or `key.signal` to the
//!   indicator's signal and only accept `==` / `!=`.
//!
//! A field that resolves to nothing is a `MissingField` error; mixing signals
//! with ordering operators or numeric sub-values is a `TypeMismatch`.

use std::collections::BTreeMap;

use crate::domain::error::RuleEvaluationError;
use crate::domain::indicator::{IndicatorResult, Signal};
use crate::domain::rule::{CompareOp, Literal, Rule};

/// Indicator results of one evaluation, keyed by snapshot key.
pub type Snapshot = BTreeMap<String, IndicatorResult>;

const SIGNAL_ATTRIBUTE: &str = "signal";

pub fn evaluate(rule: &Rule, snapshot: &Snapshot) -> Result<bool, RuleEvaluationError> {
    match rule {
        Rule::Comparison { field, op, literal } => compare(field, *op, literal, snapshot),
        Rule::And(left, right) => {
            if !evaluate(left, snapshot)? {
                return Ok(false);
            }
            evaluate(right, snapshot)
        }
        Rule::Or(left, right) => {
            if evaluate(left, snapshot)? {
                return Ok(true);
            }
            evaluate(right, snapshot)
        }
        Rule::Not(inner) => Ok(!evaluate(inner, snapshot)?),
    }
}

fn compare(
    field: &str,
    op: CompareOp,
    literal: &Literal,
    snapshot: &Snapshot,
) -> Result<bool, RuleEvaluationError> {
    match literal {
        Literal::Number(expected) => {
            let actual = resolve_number(field, snapshot)?;
            Ok(op.compare(actual, *expected))
        }
        Literal::Signal(expected) => {
            if !op.is_equality() {
                return Err(RuleEvaluationError::TypeMismatch {
                    field: field.to_string(),
                    reason: format!(
                        "signals only support == and !=, got '{}'",
                        op.symbol()
                    ),
                });
            }
            let actual = resolve_signal(field, snapshot)?;
            Ok(op.compare(actual, *expected))
        }
    }
}

fn missing(field: &str) -> RuleEvaluationError {
    RuleEvaluationError::MissingField {
        field: field.to_string(),
    }
}

fn resolve_number(field: &str, snapshot: &Snapshot) -> Result<f64, RuleEvaluationError> {
    if let Some(result) = snapshot.get(field) {
        return Ok(result.value);
    }

    if let Some((key, sub)) = field.split_once('.') {
        let result = snapshot.get(key).ok_or_else(|| missing(field))?;
        if sub == SIGNAL_ATTRIBUTE && result.field(sub).is_none() {
            return Err(RuleEvaluationError::TypeMismatch {
                field: field.to_string(),
                reason: "signal compared with a number".into(),
            });
        }
        return result.field(sub).ok_or_else(|| missing(field));
    }

    // longest key first so `sma_fast_value` prefers `sma_fast` over `sma`
    let mut candidates: Vec<(&String, &IndicatorResult)> = snapshot
        .iter()
        .filter(|(key, _)| {
            field.len() > key.len() + 1
                && field.starts_with(key.as_str())
                && field.as_bytes()[key.len()] == b'_'
        })
        .collect();
    candidates.sort_by_key(|(key, _)| std::cmp::Reverse(key.len()));

    candidates
        .into_iter()
        .find_map(|(key, result)| result.field(&field[key.len() + 1..]))
        .ok_or_else(|| missing(field))
}

fn resolve_signal(field: &str, snapshot: &Snapshot) -> Result<Signal, RuleEvaluationError> {
    if let Some(result) = snapshot.get(field) {
        return Ok(result.signal);
    }
    if let Some((key, sub)) = field.split_once('.') {
        let result = snapshot.get(key).ok_or_else(|| missing(field))?;
        if sub == SIGNAL_ATTRIBUTE {
            return Ok(result.signal);
        }
        if result.field(sub).is_some() {
            return Err(RuleEvaluationError::TypeMismatch {
                field: field.to_string(),
                reason: "numeric value compared with a signal".into(),
            });
        }
        return Err(missing(field));
    }
    match resolve_number(field, snapshot) {
        Ok(_) => Err(RuleEvaluationError::TypeMismatch {
            field: field.to_string(),
            reason: "numeric value compared with a signal".into(),
        }),
        Err(err) => Err(err),
    }
}
