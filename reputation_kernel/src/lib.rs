#![forbid(unsafe_code)]

//! Deterministic donation-power reputation engine.
//!
//! Every node of a network must derive bit-identical store contents from
//! identical inputs. No floating point, no wall clock, no global state.

/// Kernel v2. Immutable: behavioral changes require kernel_v3.
pub const KERNEL_VERSION: u32 = 2;

/// Version of the persisted record encoding and key layout.
pub const ENCODING_VERSION: u32 = 1;

pub mod arithmetic;
pub mod domain;
pub mod error;
pub mod codec;
pub mod kv;
pub mod store;
pub mod topn;
pub mod decay;
pub mod invariants;
pub mod hashing;
pub mod actions;
pub mod engine;
pub mod legacy;

pub use arithmetic::Int;
pub use domain::ReputationParams;
pub use engine::ReputationEngine;
pub use kv::{KvStore, MemKvStore};
