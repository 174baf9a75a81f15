//! Data models for marathon schedule entities.
//!
//! This module contains the data structures shared between the upstream
//! clients, the caches, and the reconciler:
//!
//! - `Event`, `EventData`: a marathon occurrence and its derived view
//! - `Run`, `RunRecord`, `RunData`, `Talent`: schedule entries
//! - `Bid`: donation incentives, optionally nested one level deep
//! - `Vod`: video-on-demand links attached to runs
//! - `RunOverride`, `EventOverride`: locally-stored corrections
//! - `ScheduleStatus`: live-show ephemeral state

pub mod bid;
pub mod event;
pub mod overrides;
pub mod run;
pub mod status;
pub mod vod;

pub use bid::{Bid, BidState};
pub use event::{Event, EventData};
pub use overrides::{EventOverride, RunOverride};
pub use run::{Run, RunData, RunRecord, Talent};
pub use status::ScheduleStatus;
pub use vod::{sort_vods, Vod, VodKind};
