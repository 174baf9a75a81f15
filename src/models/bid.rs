use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream bid state. Bids past their close are reported `CLOSED` but
/// remain in the schedule view for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BidState {
    Opened,
    Closed,
}

impl std::fmt::Display for BidState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BidState::Opened => write!(f, "OPENED"),
            BidState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A donation incentive, optionally a bid war with child options.
///
/// Upstream delivers a flat list; `children` is populated locally by the
/// bid tree builder. Observed depth never exceeds two levels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bid {
    pub id: i64,
    #[serde(rename = "parentId", default)]
    pub parent_id: Option<i64>,
    #[serde(rename = "runId", default)]
    pub run_id: Option<i64>,
    pub name: String,
    pub state: BidState,
    #[serde(default)]
    pub goal: Option<f64>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub count: i64,
    #[serde(rename = "revealedAt", default)]
    pub revealed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub children: Vec<Bid>,
}

impl Bid {
    /// A bid war is a parent with competing child options.
    pub fn is_bid_war(&self) -> bool {
        !self.children.is_empty()
    }

    /// Remaining amount until the goal is met, if this bid has a goal.
    pub fn remaining(&self) -> Option<f64> {
        self.goal.map(|g| (g - self.total).max(0.0))
    }
}
