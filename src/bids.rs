//! Bid tree reconstruction.
//!
//! Upstream delivers bids as a flat list with optional `parent_id` and
//! `run_id` references. This module rebuilds the per-run bid-war forests
//! and applies the deterministic orderings:
//!
//! - children of a bid war: `total` descending
//! - top-level bids for storage: `goal` ascending
//! - top-level bids for presentation: `(revealed_at, id)` ascending

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::models::Bid;

/// Rebuild parent/child hierarchies from a flat bid list and group the
/// resulting top-level bids by run, in storage order.
///
/// A bid id that appears both as a standalone top-level entry and as
/// another bid's parent keeps only the parent role; the duplicate
/// standalone entry is suppressed. Children whose parent is absent from
/// the input are dropped.
pub fn build_bid_trees(bids: Vec<Bid>) -> HashMap<i64, Vec<Bid>> {
    let mut children_by_parent: HashMap<i64, Vec<Bid>> = HashMap::new();
    let mut top_level: Vec<Bid> = Vec::new();
    let mut seen_top_level: Vec<i64> = Vec::new();

    for bid in bids {
        match bid.parent_id {
            Some(parent) => children_by_parent.entry(parent).or_default().push(bid),
            None => {
                if bid.run_id.is_none() {
                    continue;
                }
                // Upstream sometimes lists a bid-war parent twice; keep one.
                if seen_top_level.contains(&bid.id) {
                    debug!(bid = bid.id, "Suppressing duplicate top-level bid");
                    continue;
                }
                seen_top_level.push(bid.id);
                top_level.push(bid);
            }
        }
    }

    let mut by_run: HashMap<i64, Vec<Bid>> = HashMap::new();
    for mut bid in top_level {
        if let Some(mut children) = children_by_parent.remove(&bid.id) {
            // Children ordered by donation total, highest first.
            children.sort_by(|a, b| {
                b.total
                    .partial_cmp(&a.total)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            bid.children = children;
        }
        let Some(run_id) = bid.run_id else { continue };
        by_run.entry(run_id).or_default().push(bid);
    }

    if !children_by_parent.is_empty() {
        let orphans: usize = children_by_parent.values().map(Vec::len).sum();
        debug!(count = orphans, "Dropping child bids with unknown parents");
    }

    for bids in by_run.values_mut() {
        sort_for_storage(bids);
    }
    by_run
}

/// Storage ordering for a run's top-level bids: `goal` ascending, id as
/// tie-break. Bids without a goal sort first.
pub fn sort_for_storage(bids: &mut [Bid]) {
    bids.sort_by(|a, b| {
        a.goal
            .partial_cmp(&b.goal)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Presentation ordering for a run's top-level bids: `revealed_at`
/// ascending (unrevealed first), id as tie-break.
pub fn sort_for_display(bids: &mut [Bid]) {
    bids.sort_by(|a, b| {
        a.revealed_at
            .cmp(&b.revealed_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BidState;
    use chrono::{Duration, Utc};

    fn bid(id: i64, parent: Option<i64>, run: Option<i64>, total: f64) -> Bid {
        Bid {
            id,
            parent_id: parent,
            run_id: run,
            name: format!("bid {}", id),
            state: BidState::Opened,
            goal: None,
            total,
            count: 0,
            revealed_at: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_bid_war_ordering() {
        let trees = build_bid_trees(vec![
            bid(1, None, Some(10), 0.0),
            bid(2, Some(1), None, 5.0),
            bid(3, Some(1), None, 10.0),
        ]);

        let run_bids = &trees[&10];
        assert_eq!(run_bids.len(), 1);
        assert_eq!(run_bids[0].id, 1);
        let child_ids: Vec<i64> = run_bids[0].children.iter().map(|c| c.id).collect();
        assert_eq!(child_ids, vec![3, 2]);
    }

    #[test]
    fn test_duplicate_top_level_entry_suppressed() {
        let trees = build_bid_trees(vec![
            bid(1, None, Some(10), 0.0),
            bid(1, None, Some(10), 0.0),
            bid(2, Some(1), None, 3.0),
        ]);

        let run_bids = &trees[&10];
        assert_eq!(run_bids.len(), 1);
        assert_eq!(run_bids[0].children.len(), 1);
    }

    #[test]
    fn test_top_level_without_run_dropped() {
        let trees = build_bid_trees(vec![bid(1, None, None, 0.0)]);
        assert!(trees.is_empty());
    }

    #[test]
    fn test_orphan_children_dropped() {
        let trees = build_bid_trees(vec![
            bid(1, None, Some(10), 0.0),
            bid(2, Some(99), None, 3.0),
        ]);
        assert_eq!(trees[&10].len(), 1);
        assert!(trees[&10][0].children.is_empty());
    }

    #[test]
    fn test_storage_order_by_goal() {
        let mut a = bid(1, None, Some(10), 0.0);
        a.goal = Some(500.0);
        let mut b = bid(2, None, Some(10), 0.0);
        b.goal = Some(100.0);
        let c = bid(3, None, Some(10), 0.0); // no goal sorts first

        let trees = build_bid_trees(vec![a, b, c]);
        let ids: Vec<i64> = trees[&10].iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_display_order_by_revealed_then_id() {
        let now = Utc::now();
        let mut a = bid(5, None, Some(10), 0.0);
        a.revealed_at = Some(now);
        let mut b = bid(2, None, Some(10), 0.0);
        b.revealed_at = Some(now - Duration::hours(1));
        let mut c = bid(9, None, Some(10), 0.0);
        c.revealed_at = Some(now - Duration::hours(1));

        let mut bids = vec![a, b, c];
        sort_for_display(&mut bids);
        let ids: Vec<i64> = bids.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![2, 9, 5]);
    }
}
