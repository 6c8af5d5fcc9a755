// src/ingest/mod.rs
pub mod normalize;
pub mod providers;
pub mod rules;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

use crate::errors::DigestError;
use crate::ingest::normalize::{normalize_with_stats, NormalizeOptions, NormalizeStats};
use crate::ingest::types::{Event, Importance, SourceBatch, SourceProvider};
use crate::window::ReportWindow;

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_metrics);
}

fn describe_metrics() {
    describe_counter!("ingest_records_total", "Raw records parsed from sources.");
    describe_counter!("ingest_kept_total", "Events kept after normalization + filtering.");
    describe_counter!(
        "ingest_filtered_total",
        "Records dropped: unresolved time, outside window, or below importance."
    );
    describe_counter!("ingest_dedup_total", "Records removed as duplicates.");
    describe_counter!("ingest_provider_errors_total", "Source fetch/parse errors.");
    describe_histogram!("ingest_parse_ms", "Source parse time in milliseconds.");
    describe_counter!("fetch_attempts_total", "HTTP attempts made by the fetch client.");
    describe_counter!("fetch_failures_total", "HTTP attempts that failed.");
    describe_gauge!("ingest_pipeline_last_run_ts", "Unix time of the last completed ingest run.");
}

/// Max chars kept from any source text.
const TEXT_CAP: usize = 300;

/// Normalize text: decode entities, strip tags, fold whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (NBSP included)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Trailing separators left over from table cells
    while out.ends_with([',', ';', '|']) {
        out.pop();
        out.truncate(out.trim_end().len());
    }

    if out.chars().count() > TEXT_CAP {
        out = out.chars().take(TEXT_CAP).collect();
    }
    out
}

/// Try providers in order. The first batch with records wins; a recognized but
/// empty batch counts as a quiet calendar if nothing else has data. Fails only
/// when no provider produced a usable answer.
pub async fn collect_records(
    providers: &[Box<dyn SourceProvider>],
    window: &ReportWindow,
    now: DateTime<Utc>,
) -> Result<(SourceBatch, &'static str), DigestError> {
    ensure_metrics_described();

    let mut quiet: Option<(SourceBatch, &'static str)> = None;
    let mut tried = Vec::with_capacity(providers.len());

    for p in providers {
        tried.push(p.name().to_string());
        match p.fetch_records(window, now).await {
            Ok(batch) if batch.recognized && !batch.records.is_empty() => {
                tracing::info!(target: "ingest", provider = p.name(), records = batch.records.len(), "source ok");
                return Ok((batch, p.name()));
            }
            Ok(batch) if batch.recognized => {
                tracing::info!(target: "ingest", provider = p.name(), "source reachable but empty, trying next");
                quiet.get_or_insert((batch, p.name()));
            }
            Ok(_) => {
                tracing::warn!(target: "ingest", provider = p.name(), "unrecognized source payload, trying next");
                counter!("ingest_provider_errors_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", provider = p.name(), error = %format!("{e:#}"), "source failed, trying next");
                counter!("ingest_provider_errors_total").increment(1);
            }
        }
    }

    quiet.ok_or(DigestError::SourcesExhausted { tried })
}

/// Collect, then normalize. Returns the events plus normalization stats.
pub async fn run_once(
    providers: &[Box<dyn SourceProvider>],
    window: &ReportWindow,
    now: DateTime<Utc>,
    min_importance: Importance,
    opts: NormalizeOptions,
) -> Result<(Vec<Event>, NormalizeStats), DigestError> {
    let (batch, provider) = collect_records(providers, window, now).await?;
    let opts = NormalizeOptions {
        tie_break: batch.tie_break,
        ..opts
    };
    let (events, stats) = normalize_with_stats(batch.records, window, min_importance, &opts);

    counter!("ingest_kept_total").increment(stats.kept as u64);
    counter!("ingest_filtered_total").increment(stats.filtered() as u64);
    counter!("ingest_dedup_total").increment(stats.duplicates as u64);
    gauge!("ingest_pipeline_last_run_ts").set(now.timestamp() as f64);

    tracing::info!(
        target: "ingest",
        provider,
        input = stats.input,
        kept = stats.kept,
        unresolved = stats.unresolved,
        out_of_window = stats.out_of_window,
        below_importance = stats.below_importance,
        dedup = stats.duplicates,
        "normalized"
    );
    Ok((events, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{RawImportance, RawWhen, SourceRecord, TieBreak};
    use crate::window::WindowKind;
    use anyhow::anyhow;
    use chrono::{NaiveDate, TimeZone};

    #[derive(Default)]
    struct Described(std::sync::Mutex<Vec<String>>);

    impl metrics::Recorder for Described {
        fn describe_counter(&self, key: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {
            self.0.lock().unwrap().push(key.as_str().to_string());
        }
        fn describe_gauge(&self, key: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {
            self.0.lock().unwrap().push(key.as_str().to_string());
        }
        fn describe_histogram(&self, key: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {
            self.0.lock().unwrap().push(key.as_str().to_string());
        }
        fn register_counter(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
            metrics::Counter::noop()
        }
        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::noop()
        }
        fn register_histogram(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn every_emitted_metric_is_described() {
        let rec = Described::default();
        metrics::with_local_recorder(&rec, describe_metrics);
        let names = rec.0.lock().unwrap();
        for emitted in [
            "ingest_records_total",
            "ingest_kept_total",
            "ingest_filtered_total",
            "ingest_dedup_total",
            "ingest_provider_errors_total",
            "ingest_parse_ms",
            "fetch_attempts_total",
            "fetch_failures_total",
            "ingest_pipeline_last_run_ts",
        ] {
            assert!(names.iter().any(|n| n == emitted), "{emitted} not described");
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_entities() {
        let s = "  Nonfarm&nbsp;&nbsp; <b>Payrolls</b>  ";
        assert_eq!(normalize_text(s), "Nonfarm Payrolls");
    }

    #[test]
    fn normalize_text_keeps_meaningful_punctuation() {
        assert_eq!(normalize_text("CPI m/m (Feb)"), "CPI m/m (Feb)");
        assert_eq!(normalize_text("&ldquo;Beige&rdquo; Book |"), "\"Beige\" Book");
        assert!(normalize_text(&"x".repeat(1_000)).chars().count() <= TEXT_CAP);
    }

    enum Script {
        Fail,
        Unrecognized,
        Empty,
        Records,
    }

    struct Scripted(&'static str, Script);

    #[async_trait::async_trait]
    impl SourceProvider for Scripted {
        async fn fetch_records(&self, _w: &ReportWindow, _now: DateTime<Utc>) -> anyhow::Result<SourceBatch> {
            match self.1 {
                Script::Fail => Err(anyhow!("boom")),
                Script::Unrecognized => Ok(SourceBatch::default()),
                Script::Empty => Ok(SourceBatch {
                    recognized: true,
                    ..SourceBatch::default()
                }),
                Script::Records => Ok(SourceBatch {
                    records: vec![SourceRecord::new(
                        RawWhen::DateTime("2025-03-07T13:30:00Z".into()),
                        RawImportance::Label("High".into()),
                        "Nonfarm Payrolls",
                    )],
                    recognized: true,
                    tie_break: TieBreak::Title,
                }),
            }
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    fn window() -> ReportWindow {
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        ReportWindow {
            from_date: d,
            to_date: d,
            is_weekly: false,
            header_label: String::new(),
            kind: WindowKind::Daily,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 6, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn falls_back_to_next_source_on_failure() {
        let providers: Vec<Box<dyn SourceProvider>> = vec![
            Box::new(Scripted("feed", Script::Fail)),
            Box::new(Scripted("markup", Script::Records)),
        ];
        let (batch, name) = collect_records(&providers, &window(), now()).await.unwrap();
        assert_eq!(name, "markup");
        assert_eq!(batch.records.len(), 1);
    }

    #[tokio::test]
    async fn quiet_source_is_acceptable_when_nothing_else_has_data() {
        let providers: Vec<Box<dyn SourceProvider>> = vec![
            Box::new(Scripted("feed", Script::Empty)),
            Box::new(Scripted("markup", Script::Unrecognized)),
        ];
        let (batch, name) = collect_records(&providers, &window(), now()).await.unwrap();
        assert_eq!(name, "feed");
        assert!(batch.records.is_empty());
    }

    #[tokio::test]
    async fn all_sources_failing_is_fatal() {
        let providers: Vec<Box<dyn SourceProvider>> = vec![
            Box::new(Scripted("feed", Script::Fail)),
            Box::new(Scripted("markup", Script::Unrecognized)),
        ];
        let err = collect_records(&providers, &window(), now()).await.unwrap_err();
        match err {
            DigestError::SourcesExhausted { tried } => assert_eq!(tried, vec!["feed", "markup"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn run_once_uses_the_batch_tie_break() {
        let providers: Vec<Box<dyn SourceProvider>> = vec![Box::new(Scripted("feed", Script::Records))];
        let (events, stats) = run_once(
            &providers,
            &window(),
            now(),
            Importance::Medium,
            NormalizeOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(stats.kept, 1);
        assert_eq!(events[0].local_time, "14:30");
    }
}
