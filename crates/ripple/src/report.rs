//! Round reports and firing history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activation::{ActivationId, ActivationStatus};
use crate::state::Outcome;

/// What one round did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: u64,
    /// Instances created this round.
    pub new_instances: usize,
    /// Instances retired because they were superseded or expired.
    pub retired: usize,
    /// States whose activation fired, in firing order.
    pub fired: Vec<String>,
    /// States whose activation lost arbitration and was wiped.
    pub wiped: Vec<String>,
    /// States whose matched activation waits for a running action to
    /// release a write property.
    pub deferred: Vec<String>,
    /// States whose action finished before this round.
    pub completed: Vec<String>,
    /// States deregistered by `Outcome::Delete`.
    pub deleted: Vec<String>,
}

impl RoundReport {
    pub(crate) fn new(round: u64) -> Self {
        Self {
            round,
            ..Self::default()
        }
    }

    /// Nothing happened.
    pub fn is_quiet(&self) -> bool {
        self.new_instances == 0
            && self.retired == 0
            && self.fired.is_empty()
            && self.wiped.is_empty()
            && self.completed.is_empty()
            && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FiringStatus {
    Running,
    Finished(Outcome),
    Failed(String),
}

/// One firing, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiringRecord {
    pub activation: ActivationId,
    pub round: u64,
    pub state: String,
    pub specificity: f64,
    /// Signals of the satisfied conjunct, or empty for receptor calls.
    pub signals: Vec<String>,
    pub fired_at: DateTime<Utc>,
    pub status: FiringStatus,
}

/// Snapshot of a live activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationInfo {
    pub id: ActivationId,
    pub state: String,
    pub status: ActivationStatus,
    pub specificity: f64,
    pub signals: Vec<String>,
    pub claims: Vec<String>,
}
