// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::window::ReportWindow;

/// When a source says the event happens, in whatever shape it said it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawWhen {
    /// Unix seconds.
    Timestamp(i64),
    /// One combined string: RFC 3339 with offset, or a naive ISO date-time.
    DateTime(String),
    /// Separate day label and time strings as printed by the source, in the
    /// configured timezone.
    LocalParts { day_label: String, time: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawImportance {
    /// Star/bull count already collapsed by the adapter.
    Stars(u8),
    /// Free-text impact label ("High", "Medium", "Low", "Holiday", ...).
    Label(String),
    Missing,
}

/// Source-shaped intermediate. Never leaves the ingest pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub origin_id: Option<String>,
    pub when: RawWhen,
    pub importance: RawImportance,
    pub title: String,
    pub forecast: Option<String>,
    pub previous: Option<String>,
}

impl SourceRecord {
    pub fn new(when: RawWhen, importance: RawImportance, title: impl Into<String>) -> Self {
        Self {
            origin_id: None,
            when,
            importance,
            title: title.into(),
            forecast: None,
            previous: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Importance {
    Medium,
    High,
}

impl Importance {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "medium" | "2" => Ok(Importance::Medium),
            "high" | "3" => Ok(Importance::High),
            other => anyhow::bail!("unknown importance tier: {other}"),
        }
    }

    pub fn stars(self) -> &'static str {
        match self {
            Importance::Medium => "⭐⭐",
            Importance::High => "⭐⭐⭐",
        }
    }
}

/// Canonical event, only built once `occurs_at` is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub occurs_at: DateTime<Utc>,
    pub local_date: NaiveDate,
    /// `HH:MM` in the configured timezone.
    pub local_time: String,
    pub weekday_label: String,
    pub title: String,
    pub importance: Importance,
    pub origin_id: Option<String>,
    pub description: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
}

/// How records that share a `(date, time)` key are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Keep the order the source listed them in.
    #[default]
    DocumentOrder,
    /// Order by title, for a fully deterministic result.
    Title,
}

/// Output of one provider run.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub records: Vec<SourceRecord>,
    /// False when the payload did not look like this source at all.
    pub recognized: bool,
    pub tie_break: TieBreak,
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_records(&self, window: &ReportWindow, now: DateTime<Utc>) -> Result<SourceBatch>;
    fn name(&self) -> &'static str;
}
