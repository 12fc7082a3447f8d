//! Kernel v2: Invariant Checks
//!
//! Hard-fail validation of records before they are persisted.
//! `validate_*` panics on the first failure; `try_validate_*` reports it.

use std::collections::BTreeSet;

use crate::domain::{RoundRecord, UserRecord};
use crate::topn::is_sorted_desc;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Panics if `user` breaks a record invariant.
pub fn validate_user(user: &UserRecord, user_max_n: usize) {
    if let Err(msg) = try_validate_user(user, user_max_n) {
        panic!("Invariant violation: {}", msg);
    }
}

/// Panics if `round` breaks a record invariant.
pub fn validate_round(round: &RoundRecord, best_n: usize) {
    if let Err(msg) = try_validate_round(round, best_n) {
        panic!("Invariant violation: {}", msg);
    }
}

/// Non-panicking variant of `validate_user`. Used when checking imported
/// or replayed stores without aborting the process.
pub fn try_validate_user(user: &UserRecord, user_max_n: usize) -> Result<(), String> {
    if user.reputation.is_negative() {
        return Err(format!("[user:rep] negative reputation {}", user.reputation));
    }
    if user.hold.is_negative() {
        return Err(format!("[user:hold] negative hold {}", user.hold));
    }
    if user.consumption.is_negative() {
        return Err(format!("[user:cs] negative consumption {}", user.consumption));
    }
    if user.unsettled.len() > user_max_n {
        return Err(format!(
            "[user:ust] {} unsettled donations exceed limit {}",
            user.unsettled.len(),
            user_max_n
        ));
    }
    let mut seen = BTreeSet::new();
    for d in &user.unsettled {
        if !seen.insert(d.pid.as_str()) {
            return Err(format!("[user:ust] post {:?} listed twice", d.pid));
        }
        if d.impact.is_negative() {
            return Err(format!("[user:ust] negative impact on {:?}", d.pid));
        }
    }
    if !user.unsettled.is_empty() && user.last_settled_round >= user.last_donation_round {
        return Err(format!(
            "[user:ls] unsettled donations of round {} already settled at {}",
            user.last_donation_round, user.last_settled_round
        ));
    }
    Ok(())
}

pub fn try_validate_round(round: &RoundRecord, best_n: usize) -> Result<(), String> {
    if round.top_n.len() > best_n {
        return Err(format!(
            "[round:top_n] {} entries exceed best_n {}",
            round.top_n.len(),
            best_n
        ));
    }
    if !is_sorted_desc(&round.top_n) {
        return Err("[round:top_n] leaderboard not sorted descending".to_string());
    }
    if round.sum_if.is_negative() {
        return Err(format!("[round:sum_if] negative sum {}", round.sum_if));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic::Int;
    use crate::domain::{Donation, PostImpact};

    fn donation(pid: &str) -> Donation {
        Donation {
            pid: pid.to_string(),
            amount: Int::from(1),
            impact: Int::from(1),
        }
    }

    #[test]
    fn test_initial_user_is_valid() {
        assert!(try_validate_user(&UserRecord::initial(&Int::from(1)), 1).is_ok());
    }

    #[test]
    fn test_too_many_unsettled() {
        let mut u = UserRecord::initial(&Int::from(1));
        u.last_donation_round = 1;
        u.unsettled = vec![donation("a"), donation("b")];
        assert!(try_validate_user(&u, 2).is_ok());
        let err = try_validate_user(&u, 1).unwrap_err();
        assert!(err.contains("exceed limit"));
    }

    #[test]
    fn test_duplicate_post() {
        let mut u = UserRecord::initial(&Int::from(1));
        u.last_donation_round = 1;
        u.unsettled = vec![donation("a"), donation("a")];
        assert!(try_validate_user(&u, 5).unwrap_err().contains("twice"));
    }

    #[test]
    #[should_panic(expected = "negative reputation")]
    fn test_negative_reputation_panics() {
        let mut u = UserRecord::initial(&Int::from(1));
        u.reputation = Int::from(-1);
        validate_user(&u, 5);
    }

    #[test]
    #[should_panic(expected = "not sorted")]
    fn test_unsorted_top_n_panics() {
        let round = RoundRecord {
            top_n: vec![
                PostImpact {
                    pid: "a".to_string(),
                    sum_if: Int::from(1),
                },
                PostImpact {
                    pid: "b".to_string(),
                    sum_if: Int::from(2),
                },
            ],
            ..RoundRecord::default()
        };
        validate_round(&round, 5);
    }
}
