//! Client for the alternate spreadsheet-like schedule API.
//!
//! Schedules expose named columns; rows carry an external row id plus
//! free-form cells for game, players, platform, and category. This source
//! has no stable run ids of its own beyond the row id.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiError;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Well-known column names. Player lists appear under either spelling.
const COL_ID: &str = "ID";
const COL_GAME: &str = "Game";
const COL_PLAYERS: &str = "Player(s)";
const COL_PLAYERS_ALT: &str = "Players";
const COL_PLATFORM: &str = "Platform";
const COL_CATEGORY: &str = "Category";

/// An alternate-source schedule: ordered columns and one row per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AltSchedule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub items: Vec<AltRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AltRow {
    #[serde(rename = "lengthSeconds", default)]
    pub length_seconds: i64,
    #[serde(default)]
    pub scheduled: Option<DateTime<Utc>>,
    /// One cell per column; absent cells are null upstream.
    #[serde(default)]
    pub data: Vec<Option<String>>,
}

impl AltSchedule {
    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// External row id for this source's rows.
    pub fn row_id<'a>(&self, row: &'a AltRow) -> Option<&'a str> {
        self.cell_in(row, COL_ID)
    }

    pub fn game<'a>(&self, row: &'a AltRow) -> Option<&'a str> {
        self.cell_in(row, COL_GAME)
    }

    pub fn players<'a>(&self, row: &'a AltRow) -> Option<&'a str> {
        self.cell_in(row, COL_PLAYERS)
            .or_else(|| self.cell_in(row, COL_PLAYERS_ALT))
    }

    pub fn platform<'a>(&self, row: &'a AltRow) -> Option<&'a str> {
        self.cell_in(row, COL_PLATFORM)
    }

    pub fn category<'a>(&self, row: &'a AltRow) -> Option<&'a str> {
        self.cell_in(row, COL_CATEGORY)
    }

    // The returned str borrows from the row, not from self.
    fn cell_in<'a>(&self, row: &'a AltRow, name: &str) -> Option<&'a str> {
        let idx = self.column_index(name)?;
        row.data.get(idx)?.as_deref()
    }
}

/// Contract consumed by the reconciler for the alternate schedule source.
pub trait ScheduleClient: Send + Sync {
    fn get_schedule(
        &self,
        event_external_id: &str,
        schedule_slug: &str,
    ) -> impl Future<Output = Result<Option<AltSchedule>>> + Send;
}

#[derive(Clone)]
pub struct HttpScheduleClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScheduleClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl ScheduleClient for HttpScheduleClient {
    async fn get_schedule(
        &self,
        event_external_id: &str,
        schedule_slug: &str,
    ) -> Result<Option<AltSchedule>> {
        let url = format!(
            "{}/{}/schedules/{}",
            self.base_url, event_external_id, schedule_slug
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body).into());
        }

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        let schedule: AltSchedule = serde_json::from_str(&text)
            .map_err(|e| ApiError::Decode(format!("{}: {}", url, e)))?;
        Ok(Some(schedule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> AltSchedule {
        AltSchedule {
            id: "sched1".into(),
            name: "Main schedule".into(),
            columns: vec![
                "ID".into(),
                "Game".into(),
                "Player(s)".into(),
                "Platform".into(),
                "Category".into(),
            ],
            items: vec![AltRow {
                length_seconds: 1800,
                scheduled: None,
                data: vec![
                    Some("row-9".into()),
                    Some("Mega Game".into()),
                    None,
                    Some("PC".into()),
                    Some("Any%".into()),
                ],
            }],
        }
    }

    #[test]
    fn test_named_column_access() {
        let s = schedule();
        let row = &s.items[0];
        assert_eq!(s.row_id(row), Some("row-9"));
        assert_eq!(s.game(row), Some("Mega Game"));
        assert_eq!(s.players(row), None);
        assert_eq!(s.platform(row), Some("PC"));
        assert_eq!(s.category(row), Some("Any%"));
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let s = schedule();
        assert_eq!(s.column_index("game"), Some(1));
        assert_eq!(s.column_index("Runner"), None);
    }
}
