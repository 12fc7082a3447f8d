//! Kernel v2: Engine
//!
//! Top-level orchestrator. Owns the store handle and the parameters;
//! delegates math to `decay` and leaderboard upkeep to `topn`, and checks
//! every record it writes against `invariants`.
//!
//! Not safe for concurrent use. Every entry point is a read-modify-write
//! against the store and must be serialized by the host.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::actions::EngineAction;
use crate::arithmetic::{int_add, int_max, int_min, int_sub, mul_frac, Int};
use crate::decay::{
    compute_new_rep_data, compute_reputation, extract_consumption_info, DecayParams,
    ReputationData,
};
use crate::domain::{
    Donation, ImpactFactor, Pid, ReputationParams, Rep, RoundId, RoundRecord, Time, UserRecord,
    UserReputationTable,
};
use crate::error::ParamsError;
use crate::hashing::canonical_hash;
use crate::invariants::{validate_round, validate_user};
use crate::kv::KvStore;
use crate::store::ReputationStore;
use crate::topn::record_increase;

pub struct ReputationEngine<S: KvStore> {
    store: ReputationStore<S>,
    params: ReputationParams,
}

impl<S: KvStore> ReputationEngine<S> {
    /// Bind an engine to `kv`. Parameters are validated once, here.
    pub fn new(kv: S, params: ReputationParams) -> Result<Self, ParamsError> {
        params.validate()?;
        let store = ReputationStore::new(kv, Int::from(params.initial_reputation));
        Ok(Self { store, params })
    }

    pub fn params(&self) -> &ReputationParams {
        &self.params
    }

    pub fn store(&self) -> &ReputationStore<S> {
        &self.store
    }

    pub fn kv(&self) -> &S {
        self.store.kv()
    }

    pub fn into_kv(self) -> S {
        self.store.into_kv()
    }

    /// Canonical hash of the whole backing store.
    pub fn state_hash(&self) -> String {
        canonical_hash(self.store.kv())
    }

    // ── donations ──────────────────────────────────────────────────

    /// Record that `u` donated `amount` to `p` in the current round and
    /// return the impact factor granted.
    ///
    /// The user's previous donation round is settled first, so unsettled
    /// donations never span two rounds.
    ///
    /// Empty identifiers and negative amounts are programmer errors and
    /// panic; hosts reject them before calling in.
    pub fn donate_at(&mut self, u: &str, p: &str, amount: &Int) -> ImpactFactor {
        if u.is_empty() {
            panic!("Length of uid must be longer than 0");
        }
        if p.is_empty() {
            panic!("Length of pid must be longer than 0");
        }
        if amount.is_negative() {
            panic!("Donation amount must not be negative, got {}", amount);
        }
        let current = self.store.current_round();
        let mut user = self.store.get_user(u);
        self.settle(&mut user, current);
        user.last_donation_round = current;
        let impact = self.append_donation(&mut user, p, amount);
        self.save_user(u, &user);
        self.inc_round_post_sum_impact(current, p, &impact);
        debug!(user = u, post = p, %amount, %impact, round = current, "donation recorded");
        impact
    }

    /// Impact granted for one donation. The total impact of a round never
    /// exceeds the reputation the user held when the round's first
    /// donation was made.
    fn append_donation(&self, user: &mut UserRecord, post: &str, amount: &Int) -> ImpactFactor {
        let mut used = Int::zero();
        let mut pos = None;
        for (i, d) in user.unsettled.iter().enumerate() {
            used += &d.impact;
            if d.pid == post {
                pos = Some(i);
            }
        }
        if pos.is_none() && user.unsettled.len() >= self.params.user_max_n {
            return Int::zero();
        }
        let available = int_max(&int_sub(&user.reputation, &used), &Int::zero());
        let impact = int_min(&available, amount);
        match pos {
            Some(i) => {
                let entry = &mut user.unsettled[i];
                entry.amount += amount;
                entry.impact += &impact;
            }
            None => user.unsettled.push(Donation {
                pid: post.to_string(),
                amount: amount.clone(),
                impact: impact.clone(),
            }),
        }
        impact
    }

    /// Add `dp` to the post's and the round's cumulative impact and keep
    /// the round leaderboard in order. Both records are written even when
    /// `dp` is zero.
    fn inc_round_post_sum_impact(&mut self, round: RoundId, p: &str, dp: &ImpactFactor) {
        let mut round_post = self.store.get_round_post(round, p);
        let mut round_meta = self.store.get_round(round);

        round_meta.sum_if += dp;
        round_post.sum_if += dp;
        record_increase(&mut round_meta.top_n, self.params.best_n, p, &round_post.sum_if);

        self.store.set_round_post(round, p, &round_post);
        self.save_round(round, &round_meta);
    }

    // ── reputation ─────────────────────────────────────────────────

    /// Current reputation of `u`.
    ///
    /// Settles a finished donation round first and always writes the user
    /// record back, so this is a mutation, not a plain getter.
    pub fn get_reputation(&mut self, u: &str) -> Rep {
        let current = self.store.current_round();
        let mut user = self.store.get_user(u);
        self.settle(&mut user, current);
        self.save_user(u, &user);
        user.reputation
    }

    /// Add `score` directly to the user's consumption, floored at zero.
    /// Round settlement is not involved.
    pub fn inc_free_score(&mut self, u: &str, score: &Rep) {
        let mut user = self.store.get_user(u);
        user.consumption = int_max(&int_add(&user.consumption, score), &Int::zero());
        user.reputation = compute_reputation(
            &user.consumption,
            &user.hold,
            self.params.sample_window_size,
        );
        self.save_user(u, &user);
        debug!(user = u, %score, reputation = %user.reputation, "free score applied");
    }

    /// Settle `user` against round `current`. No-op unless the user's
    /// donation round has ended and is still unsettled.
    fn settle(&mut self, user: &mut UserRecord, current: RoundId) {
        if !(user.last_settled_round < user.last_donation_round
            && user.last_donation_round < current)
        {
            return;
        }

        let round = self.store.get_round(user.last_donation_round);
        let seed_set: BTreeSet<&str> = round.result.iter().map(String::as_str).collect();
        let info = extract_consumption_info(&user.unsettled, &seed_set);
        let next = compute_new_rep_data(
            &ReputationData {
                consumption: user.consumption.clone(),
                hold: user.hold.clone(),
                reputation: user.reputation.clone(),
            },
            &info,
            self.decay_params(),
        );

        for d in &user.unsettled {
            self.store.delete_round_post(user.last_donation_round, &d.pid);
        }

        debug!(
            round = user.last_donation_round,
            seed_if = %info.seed_if,
            other_if = %info.other_if,
            consumption = %next.consumption,
            hold = %next.hold,
            reputation = %next.reputation,
            "round settled"
        );

        user.consumption = next.consumption;
        user.hold = next.hold;
        user.reputation = next.reputation;
        user.last_settled_round = user.last_donation_round;
        user.unsettled.clear();
    }

    fn decay_params(&self) -> DecayParams {
        DecayParams {
            sample_window_size: self.params.sample_window_size,
            decay_factor: self.params.decay_factor,
        }
    }

    // ── rounds ─────────────────────────────────────────────────────

    /// Current round and its start time.
    pub fn get_current_round(&self) -> (RoundId, Time) {
        let current = self.store.current_round();
        (current, self.store.get_round(current).start_at)
    }

    /// Block-end hook. Closes the current round once it has lasted
    /// `round_duration_seconds`, elects its seed set and opens the next
    /// round starting at `now`.
    ///
    /// At most one round is closed per call, however much time has passed.
    pub fn update(&mut self, now: Time) {
        let current = self.store.current_round();
        let mut round = self.store.get_round(current);
        if now.wrapping_sub(round.start_at) < self.params.round_duration_seconds {
            return;
        }

        round.result = elect_seed_set(&round);
        info!(
            round = current,
            sum_if = %round.sum_if,
            seeds = round.result.len(),
            "round closed"
        );
        self.save_round(current, &round);
        self.start_new_round(now);
    }

    fn start_new_round(&mut self, now: Time) {
        let mut game = self.store.get_game();
        game.current_round += 1;
        let next = RoundRecord {
            start_at: now,
            ..RoundRecord::default()
        };
        self.store.set_round(game.current_round, &next);
        self.store.set_game(&game);
        info!(round = game.current_round, start_at = now, "round opened");
    }

    // ── migration ──────────────────────────────────────────────────

    /// `true` while the user has never donated nor been migrated.
    pub fn require_migrate(&self, u: &str) -> bool {
        self.store.get_user(u).last_donation_round == 0
    }

    /// Seed `u` with its legacy reputation. Silent no-op once migrated.
    pub fn migrate_from_v1(&mut self, u: &str, prev: &Rep) {
        if !self.require_migrate(u) {
            return;
        }
        let mut user = self.store.get_user(u);
        user.consumption = int_max(prev, &Int::zero());
        user.reputation = compute_reputation(
            &user.consumption,
            &user.hold,
            self.params.sample_window_size,
        );
        user.last_donation_round = self.store.current_round();
        self.save_user(u, &user);
        debug!(user = u, %prev, "migrated from v1");
    }

    // ── snapshot ───────────────────────────────────────────────────

    /// Settle every user, then dump `{user, reputation}` in key order.
    pub fn export_snapshot(&mut self) -> UserReputationTable {
        for u in self.store.users() {
            self.get_reputation(&u);
        }
        let table = self.store.export();
        info!(users = table.reputations.len(), "reputation snapshot exported");
        table
    }

    /// Overwrite every listed user. Round tracking restarts from zero.
    pub fn import_snapshot(&mut self, table: &UserReputationTable) {
        self.store.import(table);
        info!(users = table.reputations.len(), "reputation snapshot imported");
    }

    /// Debug view of a user's record as stored. Does not settle.
    pub fn user_meta_json(&self, u: &str) -> String {
        let user = self.store.get_user(u);
        serde_json::to_string(&user)
            .unwrap_or_else(|e| panic!("Encoding user {:?} failed: {}", u, e))
    }

    // ── replay ─────────────────────────────────────────────────────

    /// Apply one journaled action. Returns the granted impact for
    /// donations and the reputation for reads.
    pub fn apply_action(&mut self, action: &EngineAction) -> Option<ImpactFactor> {
        match action {
            EngineAction::Donate { user, post, amount } => Some(self.donate_at(user, post, amount)),
            EngineAction::IncFreeScore { user, score } => {
                self.inc_free_score(user, score);
                None
            }
            EngineAction::Update { now } => {
                self.update(*now);
                None
            }
            EngineAction::MigrateFromV1 { user, prev } => {
                self.migrate_from_v1(user, prev);
                None
            }
            EngineAction::GetReputation { user } => Some(self.get_reputation(user)),
            EngineAction::ImportSnapshot { table } => {
                self.import_snapshot(table);
                None
            }
        }
    }

    /// Apply an ordered sequence of actions.
    pub fn apply_sequence(&mut self, actions: &[EngineAction]) {
        for action in actions {
            self.apply_action(action);
        }
    }

    // ── checked writes ─────────────────────────────────────────────

    fn save_user(&mut self, u: &str, user: &UserRecord) {
        validate_user(user, self.params.user_max_n);
        self.store.set_user(u, user);
    }

    fn save_round(&mut self, r: RoundId, round: &RoundRecord) {
        validate_round(round, self.params.best_n);
        self.store.set_round(r, round);
    }
}

/// Walk the leaderboard in order and elect posts until at least 80% of the
/// round's impact is covered. Posts without positive impact never qualify.
pub fn elect_seed_set(round: &RoundRecord) -> Vec<Pid> {
    let bound = mul_frac(&round.sum_if, 8, 10);
    let mut covered = Int::zero();
    let mut result = Vec::new();
    for entry in &round.top_n {
        if !entry.sum_if.is_positive() {
            break;
        }
        covered += &entry.sum_if;
        result.push(entry.pid.clone());
        if covered >= bound {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PostImpact;
    use crate::kv::MemKvStore;

    fn n(v: i64) -> Int {
        Int::from(v)
    }

    fn params() -> ReputationParams {
        ReputationParams {
            best_n: 30,
            user_max_n: 10,
            round_duration_seconds: 90_000,
            sample_window_size: 10,
            decay_factor: 10,
            initial_reputation: 1,
        }
    }

    fn engine_with(p: ReputationParams) -> ReputationEngine<MemKvStore> {
        ReputationEngine::new(MemKvStore::new(), p).unwrap()
    }

    fn engine() -> ReputationEngine<MemKvStore> {
        engine_with(params())
    }

    fn entry(pid: &str, v: i64) -> PostImpact {
        PostImpact {
            pid: pid.to_string(),
            sum_if: n(v),
        }
    }

    #[test]
    fn test_rejects_invalid_params() {
        let mut p = params();
        p.sample_window_size = 0;
        assert!(ReputationEngine::new(MemKvStore::new(), p).is_err());
    }

    #[test]
    fn test_elect_seed_set_covers_eighty_percent() {
        let round = RoundRecord {
            sum_if: n(100),
            top_n: vec![entry("A", 60), entry("B", 25), entry("C", 15)],
            ..RoundRecord::default()
        };
        assert_eq!(elect_seed_set(&round), vec!["A", "B"]);
    }

    #[test]
    fn test_elect_seed_set_skips_zero_impact() {
        let round = RoundRecord {
            sum_if: n(10),
            top_n: vec![entry("A", 5), entry("B", 0)],
            ..RoundRecord::default()
        };
        assert_eq!(elect_seed_set(&round), vec!["A"]);
        assert!(elect_seed_set(&RoundRecord::default()).is_empty());
    }

    #[test]
    fn test_first_donation_bounded_by_initial_reputation() {
        let mut e = engine();
        assert_eq!(e.donate_at("u1", "p1", &n(1)), n(1));
        assert_eq!(e.donate_at("u1", "p1", &n(1)), n(0));
        let user = e.store().get_user("u1");
        assert_eq!(user.unsettled.len(), 1);
        assert_eq!(user.unsettled[0].amount, n(2));
        assert_eq!(user.unsettled[0].impact, n(1));
        assert_eq!(user.last_donation_round, 1);
    }

    #[test]
    #[should_panic(expected = "Length of uid")]
    fn test_empty_uid_is_fatal() {
        engine().donate_at("", "p1", &n(1));
    }

    #[test]
    #[should_panic(expected = "Length of pid")]
    fn test_empty_pid_is_fatal() {
        engine().donate_at("u1", "", &n(1));
    }

    #[test]
    fn test_append_donation_budget_and_limit() {
        let mut p = params();
        p.user_max_n = 2;
        p.initial_reputation = 100;
        let mut e = engine_with(p);
        assert_eq!(e.donate_at("u", "p1", &n(33)), n(33));
        assert_eq!(e.donate_at("u", "p2", &n(77)), n(67));
        // third distinct post: over the limit
        assert_eq!(e.donate_at("u", "p3", &n(100)), n(0));
        assert_eq!(e.donate_at("u", "p1", &n(100)), n(0));
        assert_eq!(e.donate_at("u", "p2", &n(1000)), n(0));

        let user = e.store().get_user("u");
        assert_eq!(user.unsettled.len(), 2);
        assert_eq!(user.unsettled[0].amount, n(133));
        assert_eq!(user.unsettled[0].impact, n(33));
        assert_eq!(user.unsettled[1].amount, n(1077));
        assert_eq!(user.unsettled[1].impact, n(67));
        // the rejected post still got round bookkeeping
        let round = e.store().get_round(1);
        assert_eq!(round.sum_if, n(100));
        assert_eq!(round.top_n.len(), 3);
    }

    #[test]
    fn test_round_transitions() {
        let mut e = engine();
        assert_eq!(e.get_current_round(), (1, 0));
        e.update(0);
        assert_eq!(e.get_current_round(), (1, 0));
        // round 1 starts at 0, so any real timestamp closes it
        e.update(1_560_000_000);
        assert_eq!(e.get_current_round(), (2, 1_560_000_000));
        e.update(1_560_000_000 + 89_999);
        assert_eq!(e.get_current_round().0, 2);
        e.update(1_560_000_000 + 90_000);
        assert_eq!(e.get_current_round(), (3, 1_560_090_000));
    }

    #[test]
    fn test_update_advances_a_single_round_after_a_long_gap() {
        let mut e = engine();
        let t = 1_560_000_000;
        e.update(t);
        assert_eq!(e.get_current_round(), (2, t));
        // ten round durations later, still exactly one transition
        e.update(t + 10 * 90_000);
        assert_eq!(e.get_current_round(), (3, t + 10 * 90_000));
        assert_eq!(e.store().get_round(2).start_at, t);
    }

    #[test]
    fn test_update_never_overflows_on_extreme_clock() {
        let mut e = engine();
        e.update(1_560_000_000);
        // i64::MIN - start wraps to a large positive gap
        e.update(i64::MIN);
        assert_eq!(e.get_current_round(), (3, i64::MIN));
        // i64::MAX - i64::MIN wraps to -1
        e.update(i64::MAX);
        assert_eq!(e.get_current_round(), (3, i64::MIN));
    }

    #[test]
    #[should_panic(expected = "Donation amount must not be negative")]
    fn test_negative_donation_is_fatal() {
        let mut e = engine();
        e.donate_at("u", "p", &n(-5));
    }

    #[test]
    fn test_settlement_after_round_end() {
        let mut p = params();
        p.initial_reputation = 1000;
        let mut e = engine_with(p);
        let t = 1_560_000_000;
        e.update(t);
        assert_eq!(e.get_current_round().0, 2);
        assert_eq!(e.donate_at("u", "p", &n(1000)), n(1000));
        e.update(t + 90_000);
        assert_eq!(e.get_current_round().0, 3);
        // p was elected; consumption stays, hold rises to 1
        assert_eq!(e.store().get_round(2).result, vec!["p"]);
        assert_eq!(e.get_reputation("u"), n(990));
        let user = e.store().get_user("u");
        assert_eq!(user.last_settled_round, 2);
        assert!(user.unsettled.is_empty());
        // per-post record of the settled round is pruned
        assert!(e.store().round_posts(2).is_empty());
    }

    #[test]
    fn test_get_reputation_materializes_user() {
        let mut e = engine();
        assert!(e.store().raw_user("ghost").is_none());
        assert_eq!(e.get_reputation("ghost"), n(1));
        assert!(e.store().raw_user("ghost").is_some());
    }

    #[test]
    fn test_inc_free_score_floors_at_zero() {
        let mut e = engine();
        e.inc_free_score("u", &n(99));
        assert_eq!(e.get_reputation("u"), n(100));
        e.inc_free_score("u", &n(-1000));
        assert_eq!(e.get_reputation("u"), n(0));
        assert_eq!(e.store().get_user("u").consumption, n(0));
    }

    #[test]
    fn test_migration_is_idempotent() {
        let mut e = engine();
        assert!(e.require_migrate("user2"));
        e.migrate_from_v1("user2", &n(333));
        assert!(!e.require_migrate("user2"));
        e.migrate_from_v1("user2", &n(9999));
        assert_eq!(e.get_reputation("user2"), n(333));
    }

    #[test]
    fn test_migration_clamps_negative() {
        let mut e = engine();
        e.migrate_from_v1("u", &n(-5));
        assert_eq!(e.get_reputation("u"), n(0));
    }

    #[test]
    fn test_user_meta_json_does_not_write() {
        let e = engine();
        assert_eq!(
            e.user_meta_json("x"),
            r#"{"cs":"1","hold":"0","rep":"1","ls":0,"ldr":0,"ust":[]}"#
        );
        assert!(e.kv().is_empty());
    }

    #[test]
    fn test_apply_action_matches_direct_calls() {
        let actions = vec![
            EngineAction::Update { now: 5 },
            EngineAction::IncFreeScore {
                user: "a".to_string(),
                score: n(50),
            },
            EngineAction::Donate {
                user: "a".to_string(),
                post: "p".to_string(),
                amount: n(30),
            },
            EngineAction::MigrateFromV1 {
                user: "b".to_string(),
                prev: n(7),
            },
            EngineAction::GetReputation {
                user: "c".to_string(),
            },
        ];
        let mut replayed = engine();
        let outputs: Vec<_> = actions.iter().map(|a| replayed.apply_action(a)).collect();
        assert_eq!(outputs, vec![None, None, Some(n(30)), None, Some(n(1))]);

        let mut direct = engine();
        direct.update(5);
        direct.inc_free_score("a", &n(50));
        direct.donate_at("a", "p", &n(30));
        direct.migrate_from_v1("b", &n(7));
        direct.get_reputation("c");
        assert_eq!(replayed.state_hash(), direct.state_hash());
    }
}
