//! Kernel v2: Top-N Leaderboard Maintenance
//!
//! A round's `top_n` is sorted by `sum_if`, descending, and holds at most
//! `best_n` entries. Per-post impact only ever grows within a round, so an
//! update never needs a re-sort: the touched entry moves left until its
//! predecessor is at least as large.

use crate::arithmetic::Int;
use crate::domain::PostImpact;

/// Move the entry at `pos` towards the front while it is strictly greater
/// than its predecessor. Ties keep their order.
pub fn bubble_up(posts: &mut [PostImpact], pos: usize) {
    if pos >= posts.len() {
        panic!(
            "bubble_up: position {} out of bounds for {} entries",
            pos,
            posts.len()
        );
    }
    let mut i = pos;
    while i > 0 && posts[i - 1].sum_if < posts[i].sum_if {
        posts.swap(i - 1, i);
        i -= 1;
    }
}

/// Record that post `pid` now has cumulative impact `value`.
///
/// An entry already on the board is updated in place. A new post is only
/// admitted while the board has room or when it beats the smallest kept
/// entry; the board is truncated back to `best_n` afterwards.
/// Returns `true` if the board changed.
pub fn record_increase(top_n: &mut Vec<PostImpact>, best_n: usize, pid: &str, value: &Int) -> bool {
    let pos = match top_n.iter().position(|e| e.pid == pid) {
        Some(pos) => {
            top_n[pos].sum_if = value.clone();
            pos
        }
        None => {
            let admitted = top_n.len() < best_n
                || top_n.last().map_or(true, |smallest| smallest.sum_if < *value);
            if !admitted {
                return false;
            }
            top_n.push(PostImpact {
                pid: pid.to_string(),
                sum_if: value.clone(),
            });
            top_n.len() - 1
        }
    };
    bubble_up(top_n, pos);
    top_n.truncate(best_n);
    true
}

/// `true` if `posts` is sorted by `sum_if`, descending.
pub fn is_sorted_desc(posts: &[PostImpact]) -> bool {
    posts.windows(2).all(|w| w[0].sum_if >= w[1].sum_if)
}
