//! Hand-written protobuf types for the action journal.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Arbitrary-precision amounts travel as decimal strings.

use prost::Message;

// ── Envelope ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoActionEnvelope {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(message, optional, tag = "2")]
    pub action: Option<ProtoAction>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoAction {
    #[prost(oneof = "ActionKind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: Option<ActionKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ActionKind {
    #[prost(message, tag = "1")]
    Donate(Donate),
    #[prost(message, tag = "2")]
    IncFreeScore(IncFreeScore),
    #[prost(message, tag = "3")]
    Update(Update),
    #[prost(message, tag = "4")]
    MigrateFromV1(MigrateFromV1),
    #[prost(message, tag = "5")]
    GetReputation(GetReputation),
    #[prost(message, tag = "6")]
    ImportSnapshot(ImportSnapshot),
}

// ── Actions ────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Donate {
    #[prost(string, tag = "1")]
    pub user: String,
    #[prost(string, tag = "2")]
    pub post: String,
    #[prost(string, tag = "3")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct IncFreeScore {
    #[prost(string, tag = "1")]
    pub user: String,
    #[prost(string, tag = "2")]
    pub score: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Update {
    #[prost(int64, tag = "1")]
    pub now: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MigrateFromV1 {
    #[prost(string, tag = "1")]
    pub user: String,
    #[prost(string, tag = "2")]
    pub prev: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetReputation {
    #[prost(string, tag = "1")]
    pub user: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoUserReputation {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub customer_score: String,
    #[prost(string, tag = "3")]
    pub free_score: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ImportSnapshot {
    #[prost(message, repeated, tag = "1")]
    pub reputations: Vec<ProtoUserReputation>,
}
