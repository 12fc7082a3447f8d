//! Proto ↔ Kernel conversion bridge.
//!
//! Converts between the journal's wire types (proto_types.rs) and the
//! kernel's `EngineAction`. Amounts are decimal strings on the wire and
//! must parse back to the exact same `Int`.

use std::str::FromStr;

use thiserror::Error;

use reputation_kernel::actions::EngineAction;
use reputation_kernel::domain::{UserReputation, UserReputationTable};
use reputation_kernel::Int;

use crate::proto_types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("envelope {0} carries no action")]
    MissingAction(u64),
    #[error("envelope {sequence}: field {field} is not a decimal integer: {value:?}")]
    InvalidInt {
        sequence: u64,
        field: &'static str,
        value: String,
    },
}

/// Wrap a kernel action into a journal envelope.
pub fn action_to_proto(sequence: u64, action: &EngineAction) -> ProtoActionEnvelope {
    let kind = match action {
        EngineAction::Donate { user, post, amount } => ActionKind::Donate(Donate {
            user: user.clone(),
            post: post.clone(),
            amount: amount.to_string(),
        }),
        EngineAction::IncFreeScore { user, score } => ActionKind::IncFreeScore(IncFreeScore {
            user: user.clone(),
            score: score.to_string(),
        }),
        EngineAction::Update { now } => ActionKind::Update(Update { now: *now }),
        EngineAction::MigrateFromV1 { user, prev } => ActionKind::MigrateFromV1(MigrateFromV1 {
            user: user.clone(),
            prev: prev.to_string(),
        }),
        EngineAction::GetReputation { user } => {
            ActionKind::GetReputation(GetReputation { user: user.clone() })
        }
        EngineAction::ImportSnapshot { table } => ActionKind::ImportSnapshot(ImportSnapshot {
            reputations: table
                .reputations
                .iter()
                .map(|r| ProtoUserReputation {
                    username: r.username.clone(),
                    customer_score: r.customer_score.to_string(),
                    free_score: r.free_score.to_string(),
                })
                .collect(),
        }),
    };

    ProtoActionEnvelope {
        sequence,
        action: Some(ProtoAction { kind: Some(kind) }),
    }
}

/// Unwrap a journal envelope back into the kernel action.
pub fn proto_to_action(proto: &ProtoActionEnvelope) -> Result<EngineAction, BridgeError> {
    let seq = proto.sequence;
    let kind = proto
        .action
        .as_ref()
        .and_then(|a| a.kind.as_ref())
        .ok_or(BridgeError::MissingAction(seq))?;

    let action = match kind {
        ActionKind::Donate(d) => EngineAction::Donate {
            user: d.user.clone(),
            post: d.post.clone(),
            amount: parse_int(seq, "amount", &d.amount)?,
        },
        ActionKind::IncFreeScore(i) => EngineAction::IncFreeScore {
            user: i.user.clone(),
            score: parse_int(seq, "score", &i.score)?,
        },
        ActionKind::Update(u) => EngineAction::Update { now: u.now },
        ActionKind::MigrateFromV1(m) => EngineAction::MigrateFromV1 {
            user: m.user.clone(),
            prev: parse_int(seq, "prev", &m.prev)?,
        },
        ActionKind::GetReputation(g) => EngineAction::GetReputation {
            user: g.user.clone(),
        },
        ActionKind::ImportSnapshot(s) => {
            let mut table = UserReputationTable::default();
            for r in &s.reputations {
                table.reputations.push(UserReputation {
                    username: r.username.clone(),
                    customer_score: parse_int(seq, "customer_score", &r.customer_score)?,
                    free_score: parse_int(seq, "free_score", &r.free_score)?,
                });
            }
            EngineAction::ImportSnapshot { table }
        }
    };
    Ok(action)
}

fn parse_int(sequence: u64, field: &'static str, value: &str) -> Result<Int, BridgeError> {
    Int::from_str(value).map_err(|_| BridgeError::InvalidInt {
        sequence,
        field,
        value: value.to_string(),
    })
}
