//! Read-only view over the first-generation (v1) reputation store.
//!
//! Only what migration needs: each v1 user's last settled reputation.
//! Per-user-per-post records share the user prefix behind a `/` and are
//! skipped.

use serde::{Deserialize, Serialize};

use crate::arithmetic::{int_add, Int};
use crate::codec::{decode, Record};
use crate::domain::{RoundId, Uid};
use crate::kv::{prefix_end_bytes, KvStore};
use crate::store::{user_key, KEY_SEPARATOR};

/// v1 user record. Field names are the v1 struct's own, unrenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct LegacyUserRecord {
    pub customer_score: Int,
    pub free_score: Int,
    pub last_settled: RoundId,
    pub last_donation_round: RoundId,
}

impl Record for LegacyUserRecord {
    const KIND: &'static str = "legacy_user";
}

pub struct LegacyReader<S: KvStore> {
    kv: S,
    initial_customer_score: Int,
}

impl<S: KvStore> LegacyReader<S> {
    pub fn new(kv: S, initial_customer_score: Int) -> Self {
        Self {
            kv,
            initial_customer_score,
        }
    }

    pub fn user(&self, u: &str) -> LegacyUserRecord {
        decode(self.kv.get(&user_key(u)).as_deref()).unwrap_or_else(|| LegacyUserRecord {
            customer_score: self.initial_customer_score.clone(),
            free_score: Int::zero(),
            last_settled: 0,
            last_donation_round: 0,
        })
    }

    /// `customer_score + free_score` as last settled by v1.
    pub fn reputation(&self, u: &str) -> Int {
        let user = self.user(u);
        int_add(&user.customer_score, &user.free_score)
    }

    /// Visit every v1 user in key order; `true` from the callback stops.
    pub fn iterate_users<F: FnMut(&str) -> bool>(&self, mut cb: F) {
        let prefix = user_key("");
        let end = prefix_end_bytes(&prefix);
        for (key, _) in self.kv.range(&prefix, end.as_deref()) {
            let rest = &key[prefix.len()..];
            if rest.contains(&KEY_SEPARATOR) {
                continue;
            }
            let uid = match std::str::from_utf8(rest) {
                Ok(uid) => uid,
                Err(_) => panic!("Corrupt legacy user key: {:?}", key),
            };
            if cb(uid) {
                break;
            }
        }
    }

    /// `(user, reputation)` for every v1 user, ready for `migrate_from_v1`.
    pub fn migration_pairs(&self) -> Vec<(Uid, Int)> {
        let mut pairs = Vec::new();
        self.iterate_users(|u| {
            pairs.push((u.to_string(), self.reputation(u)));
            false
        });
        pairs
    }
}
