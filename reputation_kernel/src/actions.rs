//! Kernel v2: Engine Actions
//!
//! The mutating calls of the engine as pure data, so that a sequence of
//! calls can be journaled and replayed. Carries no logic.

use serde::{Deserialize, Serialize};

use crate::arithmetic::Int;
use crate::domain::{Pid, Time, Uid, UserReputationTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EngineAction {
    Donate { user: Uid, post: Pid, amount: Int },
    IncFreeScore { user: Uid, score: Int },
    Update { now: Time },
    MigrateFromV1 { user: Uid, prev: Int },
    /// Reading a reputation settles and persists it, so reads are replayed.
    GetReputation { user: Uid },
    ImportSnapshot { table: UserReputationTable },
}

impl EngineAction {
    /// Stable name used in logs and the journal.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineAction::Donate { .. } => "donate",
            EngineAction::IncFreeScore { .. } => "inc_free_score",
            EngineAction::Update { .. } => "update",
            EngineAction::MigrateFromV1 { .. } => "migrate_from_v1",
            EngineAction::GetReputation { .. } => "get_reputation",
            EngineAction::ImportSnapshot { .. } => "import_snapshot",
        }
    }
}
