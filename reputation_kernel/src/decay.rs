//! Kernel v2: Reputation Decay
//!
//! Pure settlement math. Given a user's unsettled donations of a finished
//! round and that round's seed set, derive the new
//! `(consumption, hold, reputation)` triple. Reads and writes nothing.

use std::collections::BTreeSet;

use crate::arithmetic::{
    div_frac, ema, int_add, int_div, int_max, int_min, int_mul, int_sub, mul_frac, Int,
};
use crate::domain::{Donation, Rep};

/// Donations of one round split by whether the target was elected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumptionInfo {
    pub seed: Int,
    pub other: Int,
    pub seed_if: Int,
    pub other_if: Int,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationData {
    pub consumption: Rep,
    pub hold: Rep,
    pub reputation: Rep,
}

/// Decay knobs shared by every settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayParams {
    pub sample_window_size: i64,
    pub decay_factor: i64,
}

pub fn extract_consumption_info(unsettled: &[Donation], seed_set: &BTreeSet<&str>) -> ConsumptionInfo {
    let mut info = ConsumptionInfo::default();
    for d in unsettled {
        if seed_set.contains(d.pid.as_str()) {
            info.seed += &d.amount;
            info.seed_if += &d.impact;
        } else {
            info.other += &d.amount;
            info.other_if += &d.impact;
        }
    }
    info
}

/// `max(consumption - hold * window, 0)`.
pub fn compute_reputation(consumption: &Rep, hold: &Rep, sample_window_size: i64) -> Rep {
    let held = int_mul(hold, &Int::from(sample_window_size));
    int_max(&int_sub(consumption, &held), &Int::zero())
}

/// Apply one round of settlement to `data`.
///
/// Seed-backed spending pulls consumption up through the EMA. Impact
/// given to non-seed posts beyond 20% of the total is charged
/// immediately, scaled by `decay_factor` percent and at least 1.
/// Whenever consumption does not shrink, the growth is folded into
/// `hold`, which never drops below 1 on that path.
pub fn compute_new_rep_data(data: &ReputationData, info: &ConsumptionInfo, params: DecayParams) -> ReputationData {
    let window = params.sample_window_size;
    let adjusted = int_min(
        &int_max(&div_frac(&info.seed_if, 8, 10), &info.seed),
        &int_add(&info.seed, &info.other),
    );

    let mut consumption = data.consumption.clone();
    if adjusted > data.consumption {
        consumption = ema(&data.consumption, &adjusted, window);
    }

    let other_limit = int_div(&int_add(&info.seed_if, &info.other_if), &Int::from(5));
    if info.other_if > other_limit {
        let penalty = int_max(
            &Int::from(1),
            &mul_frac(&int_sub(&info.other_if, &other_limit), params.decay_factor, 100),
        );
        consumption = int_max(&Int::zero(), &int_sub(&consumption, &penalty));
    }

    let mut hold = data.hold.clone();
    if consumption >= data.consumption {
        let delta = int_sub(&consumption, &data.consumption);
        hold = int_max(&Int::from(1), &ema(&data.hold, &delta, window));
    }

    let reputation = compute_reputation(&consumption, &hold, window);
    ReputationData {
        consumption,
        hold,
        reputation,
    }
}
