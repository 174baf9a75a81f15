use serde::{Deserialize, Serialize};

/// Live-show ephemeral state for an event, stored through the object store
/// but outside the cache-freshness machinery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleStatus {
    /// The event slug.
    pub id: String,
    #[serde(rename = "queueId")]
    pub queue_id: i64,
    #[serde(rename = "currentRunId", default)]
    pub current_run_id: Option<i64>,
    #[serde(rename = "usingGameScene", default)]
    pub using_game_scene: Option<bool>,
}
