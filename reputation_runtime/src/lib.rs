#![forbid(unsafe_code)]

//! Reputation runtime: host wiring around the kernel.
//!
//! Manager adapter, snapshot files, action journal, replay and drift
//! detection. No reputation math lives here; every state change goes
//! through `ReputationEngine`.

pub mod proto_types;
pub mod proto_bridge;
pub mod journal;
pub mod replay;
pub mod snapshot_codec;
pub mod drift;
pub mod config;
pub mod telemetry;
pub mod manager;

pub use config::{LogConfig, RuntimeConfig};
pub use manager::{AccountKey, Coin, ManagerError, Permlink, ReputationManager};
