//! Upstream API clients.
//!
//! Each upstream source gets a trait (the seam the reconciler consumes)
//! and a reqwest implementation:
//!
//! - `TrackerClient`: donation tracker (events, runs, bids, talent)
//! - `ScheduleClient`: alternate spreadsheet-like schedule source
//! - `VodListClient`: community-curated VOD list
//!
//! All implementations bound requests with a timeout; failures are
//! classified by `ApiError` so the reconciler can degrade to cached data.

pub mod error;
pub mod horaro;
pub mod tracker;
pub mod vods;

pub use error::ApiError;
pub use horaro::{AltRow, AltSchedule, HttpScheduleClient, ScheduleClient};
pub use tracker::{HttpTrackerClient, TrackerClient};
pub use vods::{HttpVodListClient, VodListClient};
