//! Replay orchestrator: rebuild a store from journaled actions.
//!
//! Delegates all domain logic to the kernel engine.
//! No shortcuts, no cached state logic.

use reputation_kernel::actions::EngineAction;
use reputation_kernel::{MemKvStore, ReputationEngine, ReputationParams};

/// Rebuild a store from a sequence of actions.
///
/// 1. Create a fresh engine over an empty in-memory store
/// 2. Apply each action in order
/// 3. Return (final_store, canonical_hash)
///
/// Panics if `params` are invalid or an action breaks a kernel invariant.
pub fn rebuild_store(params: &ReputationParams, actions: &[EngineAction]) -> (MemKvStore, String) {
    let mut engine = ReputationEngine::new(MemKvStore::new(), params.clone())
        .unwrap_or_else(|e| panic!("Invalid replay parameters: {}", e));
    engine.apply_sequence(actions);
    let hash = engine.state_hash();
    (engine.into_kv(), hash)
}

/// Rebuild and return only the canonical hash.
pub fn rebuild_hash(params: &ReputationParams, actions: &[EngineAction]) -> String {
    let (_, hash) = rebuild_store(params, actions);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use reputation_kernel::hashing::canonical_hash;
    use reputation_kernel::Int;

    #[test]
    fn empty_replay_hashes_empty_store() {
        let (store, hash) = rebuild_store(&ReputationParams::default(), &[]);
        assert!(store.is_empty());
        assert_eq!(hash, canonical_hash(&MemKvStore::new()));
    }

    #[test]
    fn returned_hash_matches_returned_store() {
        let actions = vec![EngineAction::IncFreeScore {
            user: "u".to_string(),
            score: Int::from(5),
        }];
        let (store, hash) = rebuild_store(&ReputationParams::default(), &actions);
        assert_eq!(canonical_hash(&store), hash);
        assert_eq!(rebuild_hash(&ReputationParams::default(), &actions), hash);
    }

    #[test]
    #[should_panic(expected = "Invalid replay parameters")]
    fn invalid_params_are_fatal() {
        let params = ReputationParams {
            best_n: 0,
            ..ReputationParams::default()
        };
        rebuild_store(&params, &[]);
    }
}
