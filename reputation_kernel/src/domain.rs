//! Kernel v2 — Core Domain Types
//!
//! Pure data. No behaviour, no transition logic.
//! Serde field names are part of the persisted format and never change.

use serde::{Deserialize, Serialize};

use crate::arithmetic::Int;
use crate::error::ParamsError;

/// User identifier. Compared byte-wise.
pub type Uid = String;
/// Content (post) identifier. Compared byte-wise.
pub type Pid = String;
/// Round number. Starts at 1; 0 means "never".
pub type RoundId = i64;
/// Unix seconds.
pub type Time = i64;

pub type Rep = Int;
pub type ImpactFactor = Int;
pub type Amount = Int;

// ── Persisted records ──────────────────────────────────────────────

/// One unsettled donation of a user inside its last donation round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Donation {
    pub pid: Pid,
    pub amount: Amount,
    pub impact: ImpactFactor,
}

/// Per-user reputation state.
///
/// `unsettled` only ever holds donations of `last_donation_round`: any
/// donation in a newer round forces settlement first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRecord {
    #[serde(rename = "cs")]
    pub consumption: Rep,
    pub hold: Rep,
    #[serde(rename = "rep")]
    pub reputation: Rep,
    #[serde(rename = "ls")]
    pub last_settled_round: RoundId,
    #[serde(rename = "ldr")]
    pub last_donation_round: RoundId,
    #[serde(rename = "ust")]
    pub unsettled: Vec<Donation>,
}

impl UserRecord {
    /// Record synthesized for a user that has never been written.
    pub fn initial(initial_reputation: &Int) -> Self {
        Self {
            consumption: initial_reputation.clone(),
            hold: Int::zero(),
            reputation: initial_reputation.clone(),
            last_settled_round: 0,
            last_donation_round: 0,
            unsettled: Vec::new(),
        }
    }
}

/// A post with its cumulative impact factor in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostImpact {
    pub pid: Pid,
    pub sum_if: ImpactFactor,
}

/// Per-round state. `result` stays empty until the round ends;
/// `top_n` is kept sorted by `sum_if`, descending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundRecord {
    pub result: Vec<Pid>,
    pub sum_if: ImpactFactor,
    pub start_at: Time,
    pub top_n: Vec<PostImpact>,
}

/// Authoritative cumulative impact of one post in one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundPostRecord {
    #[serde(rename = "dp")]
    pub sum_if: ImpactFactor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameRecord {
    pub current_round: RoundId,
}

impl Default for GameRecord {
    fn default() -> Self {
        Self { current_round: 1 }
    }
}

// ── Snapshot table ─────────────────────────────────────────────────

/// One row of the export/import table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserReputation {
    pub username: Uid,
    pub customer_score: Rep,
    pub free_score: Rep,
}

/// Whole-state reputation snapshot, users in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserReputationTable {
    pub reputations: Vec<UserReputation>,
}

// ── Parameters ─────────────────────────────────────────────────────

/// Engine parameters. Identical on every node of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReputationParams {
    /// Size of the per-round leaderboard.
    pub best_n: usize,
    /// Distinct posts a user may fund per round.
    pub user_max_n: usize,
    pub round_duration_seconds: i64,
    pub sample_window_size: i64,
    /// Percentage of excess non-seed impact removed from consumption.
    pub decay_factor: i64,
    pub initial_reputation: i64,
}

impl Default for ReputationParams {
    fn default() -> Self {
        Self {
            best_n: 200,
            user_max_n: 50,
            round_duration_seconds: 25 * 3600,
            sample_window_size: 10,
            decay_factor: 10,
            initial_reputation: 1,
        }
    }
}

impl ReputationParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.best_n == 0 {
            return Err(ParamsError::ZeroBestN);
        }
        if self.user_max_n == 0 {
            return Err(ParamsError::ZeroUserMaxN);
        }
        if self.round_duration_seconds <= 0 {
            return Err(ParamsError::RoundDuration(self.round_duration_seconds));
        }
        if self.sample_window_size <= 0 {
            return Err(ParamsError::SampleWindow(self.sample_window_size));
        }
        if self.decay_factor < 0 {
            return Err(ParamsError::DecayFactor(self.decay_factor));
        }
        if self.initial_reputation < 0 {
            return Err(ParamsError::InitialReputation(self.initial_reputation));
        }
        Ok(())
    }
}
