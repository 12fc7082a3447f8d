//! Kernel v2: Reputation Store
//!
//! Maps the four record kinds onto store keys and synthesizes defaults
//! for records that were never written. No reputation logic lives here.
//!
//! Key layout (prefixes keep the families disjoint and range-scannable):
//!
//! | record          | key                                   |
//! |-----------------|---------------------------------------|
//! | UserRecord      | `0x00 ++ uid`                         |
//! | RoundRecord     | `0x01 ++ base36(round)`               |
//! | RoundPostRecord | `0x02 ++ base36(round) ++ '/' ++ pid` |
//! | GameRecord      | `0x03`                                |

use crate::arithmetic::{int_add, int_max, Int};
use crate::codec::{decode, encode};
use crate::domain::{
    GameRecord, Pid, RoundId, RoundPostRecord, RoundRecord, Uid, UserRecord, UserReputation,
    UserReputationTable,
};
use crate::kv::{prefix_end_bytes, KvStore};

pub const KEY_SEPARATOR: u8 = b'/';

const USER_PREFIX: u8 = 0x00;
const ROUND_PREFIX: u8 = 0x01;
const ROUND_POST_PREFIX: u8 = 0x02;
const GAME_PREFIX: u8 = 0x03;

pub fn user_key(u: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + u.len());
    key.push(USER_PREFIX);
    key.extend_from_slice(u.as_bytes());
    key
}

pub fn round_key(r: RoundId) -> Vec<u8> {
    let mut key = vec![ROUND_PREFIX];
    key.extend_from_slice(format_base36(r).as_bytes());
    key
}

pub fn round_post_key(r: RoundId, p: &str) -> Vec<u8> {
    let mut key = vec![ROUND_POST_PREFIX];
    key.extend_from_slice(format_base36(r).as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(p.as_bytes());
    key
}

pub fn game_key() -> Vec<u8> {
    vec![GAME_PREFIX]
}

/// Lowercase base-36 rendering of a signed integer (`-` for negatives).
pub fn format_base36(v: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if v == 0 {
        return "0".to_string();
    }
    let mut n = v.unsigned_abs();
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    if v < 0 {
        buf.push(b'-');
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 digits are ASCII")
}

/// Stateless typed view over a `KvStore`.
pub struct ReputationStore<S: KvStore> {
    kv: S,
    initial_reputation: Int,
}

impl<S: KvStore> ReputationStore<S> {
    pub fn new(kv: S, initial_reputation: Int) -> Self {
        Self {
            kv,
            initial_reputation,
        }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn into_kv(self) -> S {
        self.kv
    }

    // ── users ──────────────────────────────────────────────────────

    pub fn get_user(&self, u: &str) -> UserRecord {
        decode(self.kv.get(&user_key(u)).as_deref())
            .unwrap_or_else(|| UserRecord::initial(&self.initial_reputation))
    }

    pub fn set_user(&mut self, u: &str, record: &UserRecord) {
        self.kv.set(&user_key(u), encode(record));
    }

    /// Raw persisted bytes of a user, if any.
    pub fn raw_user(&self, u: &str) -> Option<Vec<u8>> {
        self.kv.get(&user_key(u))
    }

    /// Visit every stored user in key order. The callback returns `true`
    /// to stop early.
    pub fn iterate_users<F: FnMut(&str) -> bool>(&self, mut cb: F) {
        let prefix = [USER_PREFIX];
        let end = prefix_end_bytes(&prefix);
        for (key, _) in self.kv.range(&prefix, end.as_deref()) {
            let uid = std::str::from_utf8(&key[1..])
                .unwrap_or_else(|_| panic!("Corrupt user key: {:?}", key));
            if cb(uid) {
                break;
            }
        }
    }

    pub fn users(&self) -> Vec<Uid> {
        let mut out = Vec::new();
        self.iterate_users(|u| {
            out.push(u.to_string());
            false
        });
        out
    }

    // ── rounds ─────────────────────────────────────────────────────

    pub fn get_round(&self, r: RoundId) -> RoundRecord {
        decode(self.kv.get(&round_key(r)).as_deref()).unwrap_or_default()
    }

    pub fn set_round(&mut self, r: RoundId, record: &RoundRecord) {
        self.kv.set(&round_key(r), encode(record));
    }

    pub fn get_round_post(&self, r: RoundId, p: &str) -> RoundPostRecord {
        decode(self.kv.get(&round_post_key(r, p)).as_deref()).unwrap_or_default()
    }

    pub fn set_round_post(&mut self, r: RoundId, p: &str, record: &RoundPostRecord) {
        self.kv.set(&round_post_key(r, p), encode(record));
    }

    pub fn delete_round_post(&mut self, r: RoundId, p: &str) {
        self.kv.delete(&round_post_key(r, p));
    }

    /// Posts with a per-round record in round `r`, in key order.
    pub fn round_posts(&self, r: RoundId) -> Vec<Pid> {
        let prefix = round_post_key(r, "");
        let end = prefix_end_bytes(&prefix);
        self.kv
            .range(&prefix, end.as_deref())
            .into_iter()
            .map(|(key, _)| String::from_utf8_lossy(&key[prefix.len()..]).into_owned())
            .collect()
    }

    // ── game ───────────────────────────────────────────────────────

    pub fn get_game(&self) -> GameRecord {
        decode(self.kv.get(&game_key()).as_deref()).unwrap_or_default()
    }

    pub fn set_game(&mut self, record: &GameRecord) {
        self.kv.set(&game_key(), encode(record));
    }

    pub fn current_round(&self) -> RoundId {
        self.get_game().current_round
    }

    // ── snapshot table ─────────────────────────────────────────────

    /// Reputation of every stored user as persisted. Does not settle.
    pub fn export(&self) -> UserReputationTable {
        let mut table = UserReputationTable::default();
        self.iterate_users(|uid| {
            let user = self.get_user(uid);
            table.reputations.push(UserReputation {
                username: uid.to_string(),
                customer_score: user.reputation,
                free_score: Int::zero(),
            });
            false
        });
        table
    }

    /// Overwrite each listed user with a fresh record carrying only the
    /// imported reputation, floored at zero. Round tracking and unsettled
    /// donations reset.
    pub fn import(&mut self, table: &UserReputationTable) {
        for row in &table.reputations {
            let record = UserRecord {
                consumption: Int::zero(),
                hold: Int::zero(),
                reputation: int_max(
                    &int_add(&row.customer_score, &row.free_score),
                    &Int::zero(),
                ),
                last_settled_round: 0,
                last_donation_round: 0,
                unsettled: Vec::new(),
            };
            self.set_user(&row.username, &record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Donation, PostImpact};
    use crate::kv::MemKvStore;

    fn store() -> ReputationStore<MemKvStore> {
        ReputationStore::new(MemKvStore::new(), Int::from(1))
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(user_key("qwe"), vec![0x00, b'q', b'w', b'e']);
        assert_eq!(round_key(3), vec![0x01, b'3']);
        assert_eq!(round_post_key(11, "xy"), vec![0x02, b'b', b'/', b'x', b'y']);
        assert_eq!(round_post_key(35, "xy"), vec![0x02, b'z', b'/', b'x', b'y']);
        assert_eq!(
            round_post_key(87, "abcd"),
            vec![0x02, b'2', b'f', b'/', b'a', b'b', b'c', b'd']
        );
        assert_eq!(game_key(), vec![0x03]);
    }

    #[test]
    fn test_format_base36() {
        assert_eq!(format_base36(0), "0");
        assert_eq!(format_base36(35), "z");
        assert_eq!(format_base36(36), "10");
        assert_eq!(format_base36(-37), "-11");
        assert_eq!(format_base36(i64::MAX), "1y2p0ij32e8e7");
    }

    #[test]
    fn test_initial_values() {
        let s = store();
        let user = s.get_user("no");
        assert_eq!(user.reputation, Int::from(1));
        assert_eq!(user.consumption, Int::from(1));
        assert_eq!(user.last_settled_round, 0);
        assert_eq!(user.last_donation_round, 0);
        assert!(user.unsettled.is_empty());

        let round = s.get_round(333);
        assert!(round.result.is_empty());
        assert!(round.sum_if.is_zero());
        assert_eq!(round.start_at, 0);
        assert!(round.top_n.is_empty());

        assert_eq!(s.current_round(), 1);
        assert!(s.get_round_post(33, "xxx").sum_if.is_zero());
        // reads never write
        assert!(s.kv().is_empty());
    }

    #[test]
    fn test_get_set_overwrites() {
        let mut s = store();
        let u1 = UserRecord {
            consumption: Int::zero(),
            hold: Int::zero(),
            reputation: Int::from(123),
            last_settled_round: 3,
            last_donation_round: 3,
            unsettled: vec![Donation {
                pid: "post1".to_string(),
                amount: Int::from(3),
                impact: Int::from(2),
            }],
        };
        let u2 = UserRecord {
            reputation: Int::from(456),
            last_settled_round: 4,
            last_donation_round: 5,
            ..u1.clone()
        };
        s.set_user("test", &u2);
        s.set_user("test", &u1);
        s.set_user("test2", &u2);
        assert_eq!(s.get_user("test"), u1);
        assert_eq!(s.get_user("test2"), u2);

        let round = RoundRecord {
            result: vec!["xzz".to_string()],
            sum_if: Int::from(234134),
            start_at: 342,
            top_n: vec![PostImpact {
                pid: "post1".to_string(),
                sum_if: Int::from(234235311),
            }],
        };
        s.set_round(4, &round);
        assert_eq!(s.get_round(4), round);

        s.set_round_post(123, "post1", &RoundPostRecord { sum_if: Int::from(342) });
        assert_eq!(s.get_round_post(123, "post1").sum_if, Int::from(342));
        s.delete_round_post(123, "post1");
        assert!(s.get_round_post(123, "post1").sum_if.is_zero());

        s.set_game(&GameRecord { current_round: 33 });
        s.set_game(&GameRecord { current_round: 443 });
        assert_eq!(s.current_round(), 443);
    }

    #[test]
    fn test_iterate_users_in_key_order_and_stop() {
        let mut s = store();
        for u in ["carol", "alice", "bob"] {
            s.set_user(u, &UserRecord::initial(&Int::from(1)));
        }
        s.set_game(&GameRecord { current_round: 2 });
        s.set_round(1, &RoundRecord::default());
        assert_eq!(s.users(), vec!["alice", "bob", "carol"]);

        let mut seen = Vec::new();
        s.iterate_users(|u| {
            seen.push(u.to_string());
            u == "bob"
        });
        assert_eq!(seen, vec!["alice", "bob"]);
    }

    #[test]
    fn test_round_posts_are_scoped_to_round() {
        let mut s = store();
        let rec = RoundPostRecord { sum_if: Int::from(1) };
        s.set_round_post(1, "b", &rec);
        s.set_round_post(1, "a", &rec);
        s.set_round_post(10, "c", &rec);
        assert_eq!(s.round_posts(1), vec!["a", "b"]);
        assert_eq!(s.round_posts(10), vec!["c"]);
    }

    #[test]
    fn test_export_import_resets_round_tracking() {
        let mut s = store();
        let u1 = UserRecord {
            consumption: Int::from(9),
            hold: Int::from(2),
            reputation: Int::from(123),
            last_settled_round: 3,
            last_donation_round: 3,
            unsettled: vec![Donation {
                pid: "post1".to_string(),
                amount: Int::from(3),
                impact: Int::from(2),
            }],
        };
        s.set_user("test", &u1);
        s.set_user(
            "test2",
            &UserRecord {
                reputation: Int::from(456),
                ..u1.clone()
            },
        );

        let table = s.export();
        assert_eq!(table.reputations.len(), 2);
        assert_eq!(table.reputations[0].username, "test");
        assert!(table.reputations[0].free_score.is_zero());

        let mut s2 = store();
        s2.import(&table);
        let t1 = s2.get_user("test");
        assert_eq!(t1.reputation, Int::from(123));
        assert_eq!(t1.last_settled_round, 0);
        assert_eq!(t1.last_donation_round, 0);
        assert!(t1.unsettled.is_empty());
        assert!(t1.consumption.is_zero());
        assert_eq!(s2.get_user("test2").reputation, Int::from(456));
    }

    #[test]
    fn test_import_sums_free_score() {
        let mut s = store();
        s.import(&UserReputationTable {
            reputations: vec![UserReputation {
                username: "u".to_string(),
                customer_score: Int::from(100),
                free_score: Int::from(20),
            }],
        });
        assert_eq!(s.get_user("u").reputation, Int::from(120));
    }

    #[test]
    fn test_import_floors_negative_rows_at_zero() {
        let mut s = store();
        s.import(&UserReputationTable {
            reputations: vec![UserReputation {
                username: "u".to_string(),
                customer_score: Int::from(-3),
                free_score: Int::from(1),
            }],
        });
        assert_eq!(s.get_user("u").reputation, Int::zero());
    }

    #[test]
    #[should_panic(expected = "Corrupt store value")]
    fn test_corrupt_user_is_fatal() {
        let mut kv = MemKvStore::new();
        kv.set(&user_key("bad"), b"{not json".to_vec());
        ReputationStore::new(kv, Int::from(1)).get_user("bad");
    }
}
