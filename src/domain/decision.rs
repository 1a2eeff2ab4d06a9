//! Engine output: the action to take and how strongly the indicators agree.

use std::fmt;

use crate::domain::indicator::Bias;
use crate::domain::rule_eval::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    /// The signal bias that supports this action; `None` for HOLD.
    pub fn bias(&self) -> Option<Bias> {
        match self {
            Action::Buy => Some(Bias::Bullish),
            Action::Sell => Some(Bias::Bearish),
            Action::Hold => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// In `[0, 1]`, rounded to four decimal places.
    pub confidence: f64,
    pub snapshot: Snapshot,
    /// One entry per configured rule, in configuration order.
    pub rules_matched: Vec<bool>,
    /// Matched rules and the non-neutral signals behind the action.
    pub reason: String,
}

impl Decision {
    /// HOLD with zero confidence and nothing computed.
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
            snapshot: Snapshot::new(),
            rules_matched: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != Action::Hold
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (confidence {:.4})", self.action, self.confidence)
    }
}
