//! runcache - schedule reconciliation and cache engine for charity
//! marathon events.
//!
//! The engine sits between unreliable upstream sources (a donation
//! tracker, an alternate spreadsheet-like schedule, a community VOD list)
//! and its callers, serving reconciled schedule views from a durable
//! cache. Upstream data is refreshed per freshness policy and merged with
//! locally-stored override records; when upstream is down, stale cached
//! data is served instead of an error.
//!
//! Entry point is [`Reconciler`], built over the client traits in [`api`]
//! so callers can substitute their own upstream implementations.

pub mod api;
pub mod bids;
pub mod cache;
pub mod config;
pub mod lookup;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod utils;

pub use api::{
    AltRow, AltSchedule, HttpScheduleClient, HttpTrackerClient, HttpVodListClient,
    ScheduleClient, TrackerClient, VodListClient,
};
pub use config::Config;
pub use lookup::{GameInfo, GameInfoClient, GameLookup};
pub use models::{
    Bid, BidState, Event, EventData, EventOverride, Run, RunData, RunOverride, RunRecord,
    ScheduleStatus, Talent, Vod, VodKind,
};
pub use reconcile::Reconciler;
