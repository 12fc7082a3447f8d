//! Drift detection: determinism verification and store comparison.
//!
//! Comparisons read stored records only. Nothing is settled, so both
//! stores are left untouched.

use std::collections::BTreeSet;

use reputation_kernel::actions::EngineAction;
use reputation_kernel::arithmetic::{int_add, int_sub, Int};
use reputation_kernel::kv::KvStore;
use reputation_kernel::store::ReputationStore;
use reputation_kernel::ReputationParams;

use crate::replay;

/// Verify determinism by replaying the same actions twice and
/// asserting identical hashes. Panics on failure.
pub fn verify_determinism(params: &ReputationParams, actions: &[EngineAction]) {
    let hash1 = replay::rebuild_hash(params, actions);
    let hash2 = replay::rebuild_hash(params, actions);

    if hash1 != hash2 {
        panic!(
            "DETERMINISM FAILURE: two replays produced different hashes.\n\
             Run 1: {}\n\
             Run 2: {}",
            hash1, hash2
        );
    }
}

/// Per-user reputation difference between two stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationChange {
    pub user: String,
    pub before: Int,
    pub after: Int,
    pub delta: Int,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    pub user_count_a: i64,
    pub user_count_b: i64,
    pub user_count_delta: i64,
    pub total_reputation_a: Int,
    pub total_reputation_b: Int,
    pub total_reputation_delta: Int,
    pub added_users: Vec<String>,
    pub removed_users: Vec<String>,
    /// Users present in both stores whose reputation differs, in key order.
    pub changed_users: Vec<ReputationChange>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        self.added_users.is_empty() && self.removed_users.is_empty() && self.changed_users.is_empty()
    }
}

/// Structured comparison of the stored reputation of every user.
pub fn compare_reputations<A: KvStore, B: KvStore>(
    store_a: &ReputationStore<A>,
    store_b: &ReputationStore<B>,
) -> DriftReport {
    let users_a: BTreeSet<String> = store_a.users().into_iter().collect();
    let users_b: BTreeSet<String> = store_b.users().into_iter().collect();

    let added: Vec<String> = users_b.difference(&users_a).cloned().collect();
    let removed: Vec<String> = users_a.difference(&users_b).cloned().collect();

    let mut changed = Vec::new();
    for u in users_a.intersection(&users_b) {
        let before = store_a.get_user(u).reputation;
        let after = store_b.get_user(u).reputation;
        if before != after {
            changed.push(ReputationChange {
                user: u.clone(),
                delta: int_sub(&after, &before),
                before,
                after,
            });
        }
    }

    let total_a = total_reputation(store_a, &users_a);
    let total_b = total_reputation(store_b, &users_b);

    DriftReport {
        user_count_a: users_a.len() as i64,
        user_count_b: users_b.len() as i64,
        user_count_delta: users_b.len() as i64 - users_a.len() as i64,
        total_reputation_delta: int_sub(&total_b, &total_a),
        total_reputation_a: total_a,
        total_reputation_b: total_b,
        added_users: added,
        removed_users: removed,
        changed_users: changed,
    }
}

fn total_reputation<S: KvStore>(store: &ReputationStore<S>, users: &BTreeSet<String>) -> Int {
    users
        .iter()
        .fold(Int::zero(), |acc, u| int_add(&acc, &store.get_user(u).reputation))
}
