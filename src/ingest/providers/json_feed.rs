// src/ingest/providers/json_feed.rs
//! Weekly JSON calendar feeds (one document per calendar week).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use metrics::{counter, histogram};
use reqwest::header;
use serde_json::{Map, Value};

use crate::country::TargetCountry;
use crate::fetch::{FetchClient, FetchRequest};
use crate::ingest::types::{
    RawImportance, RawWhen, SourceBatch, SourceProvider, SourceRecord, TieBreak,
};
use crate::localtime::LocalCalendar;
use crate::window::ReportWindow;

pub const DEFAULT_THIS_WEEK_URL: &str = "https://nfs.faireconomy.media/ff_calendar_thisweek.json";
pub const DEFAULT_NEXT_WEEK_URL: &str = "https://nfs.faireconomy.media/ff_calendar_nextweek.json";

/// Above this a numeric timestamp is taken as milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// String or number rendered as a trimmed, non-empty string.
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    let s = match field(obj, keys)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn timestamp_field(obj: &Map<String, Value>) -> Option<i64> {
    let raw = match field(obj, &["timestamp", "ts", "time_unix"])? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(if raw.unsigned_abs() >= MILLIS_THRESHOLD { raw / 1_000 } else { raw })
}

fn when_of(obj: &Map<String, Value>) -> Option<RawWhen> {
    if let Some(ts) = timestamp_field(obj) {
        return Some(RawWhen::Timestamp(ts));
    }
    let date = text_field(obj, &["date", "datetime"])?;
    match text_field(obj, &["time"]) {
        // Separate date and time columns.
        Some(time) if !date.contains('T') && !date.contains(':') => Some(RawWhen::LocalParts {
            day_label: date,
            time,
        }),
        _ => Some(RawWhen::DateTime(date)),
    }
}

/// Extract the items matching `target`. Non-object items, items without a
/// title or without any date are skipped.
pub fn parse_feed(items: &[Value], target: &TargetCountry) -> Vec<SourceRecord> {
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let title = text_field(obj, &["title", "event", "name"])?;
            let country = text_field(obj, &["country"]);
            let currency = text_field(obj, &["currency"]);
            if !target.matches(country.as_deref(), currency.as_deref()) {
                return None;
            }
            let importance = text_field(obj, &["impact", "importance"])
                .map(RawImportance::Label)
                .unwrap_or(RawImportance::Missing);
            Some(SourceRecord {
                origin_id: text_field(obj, &["id"]),
                when: when_of(obj)?,
                importance,
                title,
                forecast: text_field(obj, &["forecast", "consensus"]),
                previous: text_field(obj, &["previous"]),
            })
        })
        .collect()
}

/// The item list of a feed document: a bare array, or an array wrapped under
/// `data`, `events` or `items`.
pub fn feed_items(doc: &Value) -> Option<&[Value]> {
    match doc {
        Value::Array(items) => Some(items.as_slice()),
        Value::Object(obj) => ["data", "events", "items"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice),
        _ => None,
    }
}

/// Which weekly documents a window needs, relative to the current week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedPlan {
    pub this_week: bool,
    pub next_week: bool,
}

impl FeedPlan {
    pub fn for_window(window: &ReportWindow, this_monday: NaiveDate) -> Self {
        let this_sunday = this_monday + Duration::days(6);
        let next_monday = this_monday + Duration::days(7);
        let next_sunday = this_monday + Duration::days(13);
        let this_week = window.overlaps(this_monday, this_sunday);
        let next_week = window.overlaps(next_monday, next_sunday);
        if !this_week && !next_week {
            tracing::warn!(
                target: "ingest",
                from = %window.from_date,
                to = %window.to_date,
                %this_monday,
                "window outside the feed weeks, using current week"
            );
            return Self {
                this_week: true,
                next_week: false,
            };
        }
        Self {
            this_week,
            next_week,
        }
    }
}

pub struct WeeklyFeedProvider {
    client: FetchClient,
    this_week_url: String,
    next_week_url: Option<String>,
    target: TargetCountry,
    calendar: LocalCalendar,
}

impl WeeklyFeedProvider {
    pub fn new(
        client: FetchClient,
        this_week_url: impl Into<String>,
        next_week_url: Option<String>,
        target: TargetCountry,
        calendar: LocalCalendar,
    ) -> Self {
        Self {
            client,
            this_week_url: this_week_url.into(),
            next_week_url,
            target,
            calendar,
        }
    }

    /// `Ok(None)` when the document is JSON but has no item array.
    async fn fetch_week(&self, url: &str) -> Result<Option<Vec<SourceRecord>>> {
        let req = FetchRequest::get(url).header(header::ACCEPT, "application/json");
        let doc: Value = self
            .client
            .fetch_json(&req)
            .await
            .with_context(|| format!("feed fetch {url}"))?;
        let Some(items) = feed_items(&doc) else {
            tracing::warn!(target: "ingest", %url, "feed document has no item array");
            return Ok(None);
        };

        let t0 = std::time::Instant::now();
        let records = parse_feed(items, &self.target);
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(target: "ingest", %url, items = items.len(), kept = records.len(), "feed parsed");
        Ok(Some(records))
    }
}

#[async_trait]
impl SourceProvider for WeeklyFeedProvider {
    async fn fetch_records(&self, window: &ReportWindow, now: DateTime<Utc>) -> Result<SourceBatch> {
        let this_monday = LocalCalendar::week_start(self.calendar.date_of(now));
        let plan = FeedPlan::for_window(window, this_monday);

        let next_url = match (plan.next_week, self.next_week_url.as_deref()) {
            (true, Some(u)) => Some(u),
            (true, None) => {
                tracing::warn!(target: "ingest", "window reaches next week but no next-week feed is configured");
                None
            }
            (false, _) => None,
        };
        // A window that lives only in next week still needs some feed.
        let this_url = (plan.this_week || next_url.is_none()).then_some(self.this_week_url.as_str());

        let this_fut = async {
            match this_url {
                Some(u) => Some(self.fetch_week(u).await),
                None => None,
            }
        };
        let next_fut = async {
            match next_url {
                Some(u) => Some(self.fetch_week(u).await),
                None => None,
            }
        };
        let (this_res, next_res) = tokio::join!(this_fut, next_fut);

        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut answered = 0usize;
        let mut recognized = false;
        for res in [this_res, next_res].into_iter().flatten() {
            match res {
                Ok(Some(mut v)) => {
                    answered += 1;
                    recognized = true;
                    records.append(&mut v);
                }
                Ok(None) => answered += 1,
                Err(e) => {
                    counter!("ingest_provider_errors_total").increment(1);
                    failures.push(e);
                }
            }
        }

        if answered == 0 {
            let last = failures
                .pop()
                .unwrap_or_else(|| anyhow!("no feed url to fetch"));
            return Err(last.context("every weekly feed failed"));
        }
        for e in &failures {
            tracing::warn!(target: "ingest", provider = self.name(), error = %format!("{e:#}"), "one weekly feed failed, continuing with the rest");
        }

        counter!("ingest_records_total").increment(records.len() as u64);
        Ok(SourceBatch {
            records,
            recognized,
            tie_break: TieBreak::Title,
        })
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}
