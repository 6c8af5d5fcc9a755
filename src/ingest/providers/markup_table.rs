// src/ingest/providers/markup_table.rs
//! Calendar widget that serves an HTML table. Day labels only appear on some
//! rows; every following row belongs to the last label seen.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Url};

use crate::country::TargetCountry;
use crate::fetch::{FetchClient, FetchRequest};
use crate::ingest::normalize_text;
use crate::ingest::rules;
use crate::ingest::types::{
    Importance, RawImportance, RawWhen, SourceBatch, SourceProvider, SourceRecord, TieBreak,
};
use crate::localtime::Locale;
use crate::window::ReportWindow;

pub const DEFAULT_MARKUP_URL: &str = "https://ec.forexprostools.com/";
/// Widget timezone id matching Europe/Madrid.
pub const DEFAULT_WIDGET_TIMEZONE: &str = "56";

/// Minimum length of a cell's text to count as a day label.
const MIN_DAY_LABEL_CHARS: usize = 6;

static RE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("row regex"));

fn cell_regex(attr: &str) -> Regex {
    let pat = format!(r#"(?is)<td\b[^>]*{attr}[^>]*>(.*?)</td>"#);
    Regex::new(&pat).expect("cell regex")
}

static RE_TIME_CELLS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        cell_regex(r#"class="[^"]*\bfirst-time\b[^"]*""#),
        cell_regex(r#"data-title="Hora""#),
        cell_regex(r#"class="[^"]*\btime\b[^"]*""#),
    ]
});

static RE_DAY_CELLS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        cell_regex(r#"data-title="Fecha""#),
        cell_regex(r#"class="[^"]*\btheDay\b[^"]*""#),
    ]
});

static RE_TITLE_CELLS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        cell_regex(r#"class="[^"]*\bevent\b[^"]*""#),
        cell_regex(r#"data-title="Evento""#),
    ]
});

/// Text of the first cell matched by any of `patterns`, tags stripped.
fn cell_text(row: &str, patterns: &[Regex]) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(row))
        .map(|c| normalize_text(&c[1]))
        .filter(|s| !s.is_empty())
}

/// The row with its title cells removed, so words in a title never read as an
/// importance marker.
fn importance_signal(row: &str) -> String {
    RE_TITLE_CELLS
        .iter()
        .fold(row.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

/// True when the page contains table rows at all.
pub fn looks_like_table(html: &str) -> bool {
    RE_ROW.is_match(html)
}

/// Extract records in document order. The current day label is threaded
/// through the fold; rows seen before any label are dropped, as are rows
/// without both a time and a title.
pub fn parse_markup(html: &str) -> Vec<SourceRecord> {
    let (_, records) = RE_ROW.captures_iter(html).fold(
        (None::<String>, Vec::new()),
        |(current_day, mut out), caps| {
            let row = &caps[1];

            let day = cell_text(row, &RE_DAY_CELLS)
                .filter(|d| d.chars().count() >= MIN_DAY_LABEL_CHARS)
                .or(current_day);

            let time = cell_text(row, &RE_TIME_CELLS);
            let title = cell_text(row, &RE_TITLE_CELLS);

            if let (Some(day_label), Some(time), Some(title)) = (day.as_ref(), time, title) {
                out.push(SourceRecord::new(
                    RawWhen::LocalParts {
                        day_label: day_label.clone(),
                        time,
                    },
                    RawImportance::Stars(rules::markup_stars(&importance_signal(row))),
                    title,
                ));
            }
            (day, out)
        },
    );
    records
}

/// Query parameters for one widget request.
#[derive(Debug, Clone)]
pub struct MarkupQuery {
    pub base_url: String,
    pub country_id: String,
    pub widget_timezone: String,
    pub lang: String,
    pub min_importance: Importance,
}

impl MarkupQuery {
    pub fn url_for(&self, window: &ReportWindow) -> Result<Url> {
        let importance = match self.min_importance {
            Importance::High => "3",
            Importance::Medium => "2,3",
        };
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid markup url {}", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("country", &self.country_id)
            .append_pair("importance", importance)
            .append_pair("timeZone", &self.widget_timezone)
            .append_pair("lang", &self.lang)
            .append_pair("dateFrom", &window.from_date.format("%Y-%m-%d").to_string())
            .append_pair("dateTo", &window.to_date.format("%Y-%m-%d").to_string())
            .append_pair("columns", "exc_date,exc_time,exc_event,exc_importance");
        Ok(url)
    }
}

pub struct MarkupTableProvider {
    client: FetchClient,
    query: MarkupQuery,
}

impl MarkupTableProvider {
    pub fn new(
        client: FetchClient,
        base_url: impl Into<String>,
        target: &TargetCountry,
        locale: Locale,
        min_importance: Importance,
    ) -> Self {
        Self {
            client,
            query: MarkupQuery {
                base_url: base_url.into(),
                country_id: target.widget_id.to_string(),
                widget_timezone: DEFAULT_WIDGET_TIMEZONE.to_string(),
                lang: match locale {
                    Locale::Es => "12".to_string(),
                    Locale::En => "1".to_string(),
                },
                min_importance,
            },
        }
    }

    pub fn with_widget_timezone(mut self, id: impl Into<String>) -> Self {
        self.query.widget_timezone = id.into();
        self
    }

    pub fn query(&self) -> &MarkupQuery {
        &self.query
    }
}

#[async_trait]
impl SourceProvider for MarkupTableProvider {
    async fn fetch_records(&self, window: &ReportWindow, _now: DateTime<Utc>) -> Result<SourceBatch> {
        let url = self.query.url_for(window)?;
        tracing::info!(target: "ingest", provider = self.name(), %url, "fetching markup calendar");

        let req = FetchRequest::get(url.as_str()).header(header::ACCEPT, "text/html");
        let html = self.client.fetch_text(&req).await.context("markup calendar fetch")?;

        let t0 = std::time::Instant::now();
        let recognized = looks_like_table(&html);
        let records = if recognized {
            parse_markup(&html)
        } else {
            tracing::warn!(target: "ingest", provider = self.name(), bytes = html.len(), "page has no table rows");
            Vec::new()
        };
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_records_total").increment(records.len() as u64);

        Ok(SourceBatch {
            records,
            recognized,
            tie_break: TieBreak::DocumentOrder,
        })
    }

    fn name(&self) -> &'static str {
        "markup"
    }
}
