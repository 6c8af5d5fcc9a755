// src/ingest/normalize.rs
//! SourceRecord -> Event: timestamp resolution, window and importance filters,
//! dedup, ordering. The only place where source-shaped data becomes an Event.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::normalize_text;
use crate::ingest::rules;
use crate::ingest::types::{Event, Importance, RawImportance, RawWhen, SourceRecord, TieBreak};
use crate::localtime::{LocalCalendar, Locale};
use crate::window::ReportWindow;

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    pub calendar: LocalCalendar,
    pub locale: Locale,
    pub tie_break: TieBreak,
    pub with_descriptions: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub input: usize,
    pub unresolved: usize,
    pub out_of_window: usize,
    pub below_importance: usize,
    pub duplicates: usize,
    pub kept: usize,
}

impl NormalizeStats {
    pub fn filtered(&self) -> usize {
        self.unresolved + self.out_of_window + self.below_importance
    }
}

pub fn normalize(
    records: Vec<SourceRecord>,
    window: &ReportWindow,
    min_importance: Importance,
    opts: &NormalizeOptions,
) -> Vec<Event> {
    normalize_with_stats(records, window, min_importance, opts).0
}

pub fn normalize_with_stats(
    records: Vec<SourceRecord>,
    window: &ReportWindow,
    min_importance: Importance,
    opts: &NormalizeOptions,
) -> (Vec<Event>, NormalizeStats) {
    let cal = &opts.calendar;
    let mut stats = NormalizeStats {
        input: records.len(),
        ..NormalizeStats::default()
    };
    let mut seen: HashSet<(NaiveDate, String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());

    for rec in records {
        let title = normalize_text(&rec.title);
        let Some(occurs_at) = (!title.is_empty())
            .then(|| resolve_instant(&rec.when, cal, window.from_date))
            .flatten()
        else {
            stats.unresolved += 1;
            continue;
        };

        let local_date = cal.date_of(occurs_at);
        if !window.contains(local_date) {
            stats.out_of_window += 1;
            continue;
        }

        let Some(importance) = classify_importance(&rec.importance).filter(|i| *i >= min_importance)
        else {
            stats.below_importance += 1;
            continue;
        };

        let local_time = cal.time_of(occurs_at);
        if !seen.insert((local_date, local_time.clone(), title.to_lowercase())) {
            stats.duplicates += 1;
            continue;
        }

        let description = opts
            .with_descriptions
            .then(|| rules::describe(&title, opts.locale))
            .flatten()
            .map(str::to_string);

        out.push(Event {
            occurs_at,
            local_date,
            local_time,
            weekday_label: opts
                .locale
                .weekday_name(LocalCalendar::weekday_index(local_date))
                .to_string(),
            title: rules::decorate_title(&rules::translate_title(&title, opts.locale)),
            importance,
            origin_id: rec.origin_id,
            description,
            forecast: rec.forecast.filter(|s| !s.trim().is_empty()),
            previous: rec.previous.filter(|s| !s.trim().is_empty()),
        });
    }

    // Stable sort: equal keys keep input order under DocumentOrder.
    match opts.tie_break {
        TieBreak::DocumentOrder => {
            out.sort_by(|a, b| (a.local_date, &a.local_time).cmp(&(b.local_date, &b.local_time)))
        }
        TieBreak::Title => out.sort_by(|a, b| {
            (a.local_date, &a.local_time, &a.title).cmp(&(b.local_date, &b.local_time, &b.title))
        }),
    }

    stats.kept = out.len();
    (out, stats)
}

/// Low, holiday and unknown tiers map to `None` and are never shown.
pub fn classify_importance(raw: &RawImportance) -> Option<Importance> {
    match raw {
        RawImportance::Stars(n) if *n >= 3 => Some(Importance::High),
        RawImportance::Stars(2) => Some(Importance::Medium),
        RawImportance::Stars(_) => None,
        RawImportance::Label(s) => match s.trim().to_lowercase().as_str() {
            "high" | "alta" | "3" => Some(Importance::High),
            "medium" | "media" | "moderate" | "2" => Some(Importance::Medium),
            _ => None,
        },
        RawImportance::Missing => None,
    }
}

/// Absolute timestamp first, then a combined date+time string. `anchor` lends
/// its year to day labels that omit one.
pub fn resolve_instant(when: &RawWhen, cal: &LocalCalendar, anchor: NaiveDate) -> Option<DateTime<Utc>> {
    match when {
        RawWhen::Timestamp(secs) => DateTime::from_timestamp(*secs, 0),
        RawWhen::DateTime(s) => parse_datetime(s, cal),
        RawWhen::LocalParts { day_label, time } => {
            let date = parse_day_label(day_label, anchor)?;
            let clock = parse_clock(time)?;
            cal.resolve_local(date, clock)
        }
    }
}

fn parse_datetime(s: &str, cal: &LocalCalendar) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .and_then(|ndt| cal.resolve_naive(ndt))
}

static RE_CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\d{1,2}):(\d{2})\s*(am|pm)?\s*$").expect("clock regex"));

/// `HH:MM`, `H:MM`, or `H:MMam/pm`. "All Day", "Tentative" and friends are not times.
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    let caps = RE_CLOCK.captures(s)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    if let Some(ampm) = caps.get(3) {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = ampm.as_str().eq_ignore_ascii_case("pm");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

static RE_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").expect("iso date regex"));
static RE_US_DASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b").expect("dash date regex"));
static RE_SLASH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").expect("slash date regex")
});
static RE_ES_LONG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+de\s+(\p{L}+)(?:\s+de\s+(\d{4}))?").expect("es date regex")
});
static RE_EN_MONTH_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\p{L}+)\s+(\d{1,2})(?:st|nd|rd|th)?\b,?(?:\s+(\d{4}))?").expect("en date regex")
});
static RE_EN_DAY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(\p{L}+)(?:\s+(\d{4}))?").expect("en day-first regex")
});

fn month_number(name: &str) -> Option<u32> {
    const ES: [&str; 12] = [
        "enero",
        "febrero",
        "marzo",
        "abril",
        "mayo",
        "junio",
        "julio",
        "agosto",
        "septiembre",
        "octubre",
        "noviembre",
        "diciembre",
    ];
    const EN: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let n = name.to_lowercase();
    if n == "setiembre" {
        return Some(9);
    }
    if let Some(i) = ES.iter().position(|m| *m == n) {
        return Some(i as u32 + 1);
    }
    EN.iter()
        .position(|m| *m == n || (n.len() >= 3 && m.starts_with(&n)))
        .map(|i| i as u32 + 1)
}

fn date_with_year(year: Option<&str>, month: u32, day: u32, anchor: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(y) => {
            let mut y: i32 = y.parse().ok()?;
            if y < 100 {
                y += 2000;
            }
            NaiveDate::from_ymd_opt(y, month, day)
        }
        None => {
            let d = NaiveDate::from_ymd_opt(anchor.year(), month, day)?;
            // A label like "02/01" seen from a late-December window is next year.
            if d < anchor - Duration::days(180) {
                NaiveDate::from_ymd_opt(anchor.year() + 1, month, day)
            } else {
                Some(d)
            }
        }
    }
}

/// Day labels as printed by calendar widgets: ISO, `dd/mm[/yyyy]`,
/// `mm-dd-yyyy`, "Viernes, 7 de marzo de 2025", "Friday, March 7, 2025",
/// "7 March 2025".
pub fn parse_day_label(label: &str, anchor: NaiveDate) -> Option<NaiveDate> {
    let label = label.trim();

    if let Some(c) = RE_ISO_DATE.captures(label) {
        return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
    }
    if let Some(c) = RE_US_DASH_DATE.captures(label) {
        return date_with_year(Some(&c[3]), c[1].parse().ok()?, c[2].parse().ok()?, anchor);
    }
    if let Some(c) = RE_SLASH_DATE.captures(label) {
        return date_with_year(
            c.get(3).map(|m| m.as_str()),
            c[2].parse().ok()?,
            c[1].parse().ok()?,
            anchor,
        );
    }
    if let Some(c) = RE_ES_LONG.captures(label) {
        if let Some(month) = month_number(&c[2]) {
            return date_with_year(c.get(3).map(|m| m.as_str()), month, c[1].parse().ok()?, anchor);
        }
    }
    for c in RE_EN_MONTH_FIRST.captures_iter(label) {
        if let Some(month) = month_number(&c[1]) {
            return date_with_year(c.get(3).map(|m| m.as_str()), month, c[2].parse().ok()?, anchor);
        }
    }
    for c in RE_EN_DAY_FIRST.captures_iter(label) {
        if let Some(month) = month_number(&c[2]) {
            return date_with_year(c.get(3).map(|m| m.as_str()), month, c[1].parse().ok()?, anchor);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowKind;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn window(from: NaiveDate, to: NaiveDate) -> ReportWindow {
        ReportWindow {
            from_date: from,
            to_date: to,
            is_weekly: from != to,
            header_label: "test".into(),
            kind: WindowKind::Custom,
        }
    }

    fn rec(when: RawWhen, imp: &str, title: &str) -> SourceRecord {
        SourceRecord::new(when, RawImportance::Label(imp.into()), title)
    }

    fn ts(y: i32, m: u32, day: u32, h: u32, min: u32) -> RawWhen {
        RawWhen::Timestamp(Utc.with_ymd_and_hms(y, m, day, h, min, 0).unwrap().timestamp())
    }

    #[test]
    fn importance_filter_drops_only_low() {
        let w = window(d(2025, 3, 7), d(2025, 3, 7));
        let records = vec![
            rec(ts(2025, 3, 7, 13, 30), "High", "Nonfarm Payrolls"),
            rec(ts(2025, 3, 7, 15, 0), "Medium", "Wholesale Inventories"),
            rec(ts(2025, 3, 7, 16, 0), "Low", "Baker Hughes Rig Count"),
        ];
        let (events, stats) =
            normalize_with_stats(records, &w, Importance::Medium, &NormalizeOptions::default());
        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["📊 Nonfarm Payrolls", "Wholesale Inventories"]);
        assert_eq!(stats.below_importance, 1);
    }

    #[test]
    fn high_threshold_keeps_only_high() {
        let w = window(d(2025, 3, 7), d(2025, 3, 7));
        let records = vec![
            rec(ts(2025, 3, 7, 13, 30), "High", "Nonfarm Payrolls"),
            rec(ts(2025, 3, 7, 15, 0), "Medium", "Wholesale Inventories"),
        ];
        let events = normalize(records, &w, Importance::High, &NormalizeOptions::default());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].importance, Importance::High);
    }

    #[test]
    fn window_bounds_are_inclusive_on_local_date() {
        let w = window(d(2025, 3, 6), d(2025, 3, 7));
        let records = vec![
            // 23:30 UTC on the 5th is already the 6th in Madrid.
            rec(ts(2025, 3, 5, 23, 30), "High", "A"),
            rec(ts(2025, 3, 7, 22, 59), "High", "B"),
            // 23:00 UTC on the 7th is the 8th in Madrid.
            rec(ts(2025, 3, 7, 23, 0), "High", "C"),
            rec(ts(2025, 3, 5, 22, 0), "High", "D"),
        ];
        let events = normalize(records, &w, Importance::Medium, &NormalizeOptions::default());
        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(events[0].local_time, "00:30");
        assert_eq!(events[0].weekday_label, "Thursday");
    }

    #[test]
    fn timestamp_wins_over_strings_and_unresolvable_is_dropped() {
        let cal = LocalCalendar::default();
        let anchor = d(2025, 3, 7);
        let iso = RawWhen::DateTime("2025-03-07T08:30:00-05:00".into());
        assert_eq!(
            resolve_instant(&iso, &cal, anchor),
            Some(Utc.with_ymd_and_hms(2025, 3, 7, 13, 30, 0).unwrap())
        );
        let naive = RawWhen::DateTime("2025-03-07 14:30".into());
        assert_eq!(
            resolve_instant(&naive, &cal, anchor),
            Some(Utc.with_ymd_and_hms(2025, 3, 7, 13, 30, 0).unwrap())
        );
        let all_day = RawWhen::LocalParts {
            day_label: "07/03/2025".into(),
            time: "All Day".into(),
        };
        assert_eq!(resolve_instant(&all_day, &cal, anchor), None);

        let w = window(anchor, anchor);
        let events = normalize(
            vec![
                rec(all_day, "High", "Bank Holiday"),
                rec(RawWhen::DateTime("2025-03-07".into()), "High", "Date only"),
            ],
            &w,
            Importance::Medium,
            &NormalizeOptions::default(),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn dedup_first_wins_and_is_idempotent() {
        let w = window(d(2025, 3, 7), d(2025, 3, 7));
        let mut first = rec(ts(2025, 3, 7, 13, 30), "High", "Nonfarm  Payrolls");
        first.origin_id = Some("a".into());
        let mut dup = rec(
            RawWhen::DateTime("2025-03-07T08:30:00-05:00".into()),
            "High",
            "nonfarm payrolls",
        );
        dup.origin_id = Some("b".into());
        let other = rec(ts(2025, 3, 7, 13, 30), "Medium", "Unemployment Rate");
        let records = vec![first, dup, other];

        let opts = NormalizeOptions {
            tie_break: TieBreak::Title,
            ..NormalizeOptions::default()
        };
        let once = normalize(records.clone(), &w, Importance::Medium, &opts);
        assert_eq!(once.len(), 2);
        let nfp = once.iter().find(|e| e.title.contains("Payrolls")).unwrap();
        assert_eq!(nfp.origin_id.as_deref(), Some("a"));

        let doubled: Vec<_> = records.iter().cloned().chain(records.iter().cloned()).collect();
        let twice = normalize(doubled, &w, Importance::Medium, &opts);
        assert_eq!(once, twice);
    }

    #[test]
    fn tie_break_policies() {
        let w = window(d(2025, 3, 7), d(2025, 3, 7));
        let records = vec![
            rec(ts(2025, 3, 7, 13, 30), "High", "Zeta"),
            rec(ts(2025, 3, 7, 13, 30), "High", "Alpha"),
            rec(ts(2025, 3, 7, 9, 0), "High", "Early"),
        ];
        let doc = normalize(records.clone(), &w, Importance::Medium, &NormalizeOptions::default());
        let doc_titles: Vec<_> = doc.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(doc_titles, vec!["Early", "Zeta", "Alpha"]);

        let opts = NormalizeOptions {
            tie_break: TieBreak::Title,
            ..NormalizeOptions::default()
        };
        let by_title = normalize(records, &w, Importance::Medium, &opts);
        let titles: Vec<_> = by_title.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Early", "Alpha", "Zeta"]);
    }

    #[test]
    fn spanish_locale_translates_and_describes() {
        let w = window(d(2025, 3, 7), d(2025, 3, 7));
        let opts = NormalizeOptions {
            locale: Locale::Es,
            with_descriptions: true,
            ..NormalizeOptions::default()
        };
        let events = normalize(
            vec![rec(ts(2025, 3, 7, 13, 30), "High", "Nonfarm Payrolls")],
            &w,
            Importance::Medium,
            &opts,
        );
        assert_eq!(events[0].title, "📊 Empleo no agrícola (NFP)");
        assert_eq!(events[0].weekday_label, "Viernes");
        assert!(events[0].description.as_deref().unwrap().starts_with("Empleo no agrícola"));
    }

    #[test]
    fn day_labels_in_many_shapes() {
        let anchor = d(2025, 3, 3);
        let want = d(2025, 3, 7);
        for label in [
            "2025-03-07",
            "07/03/2025",
            "7/3",
            "03-07-2025",
            "Viernes, 7 de marzo de 2025",
            "viernes 7 de marzo",
            "Friday, March 7, 2025",
            "Fri Mar 7th",
            "7 March 2025",
        ] {
            assert_eq!(parse_day_label(label, anchor), Some(want), "{label}");
        }
        assert_eq!(parse_day_label("02/01", d(2025, 12, 29)), Some(d(2026, 1, 2)));
        assert_eq!(parse_day_label("Hora", anchor), None);
    }

    #[test]
    fn clock_formats() {
        assert_eq!(parse_clock("14:30"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(parse_clock("8:30am"), NaiveTime::from_hms_opt(8, 30, 0));
        assert_eq!(parse_clock("1:05pm"), NaiveTime::from_hms_opt(13, 5, 0));
        assert_eq!(parse_clock("12:00am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_clock("Tentative"), None);
        assert_eq!(parse_clock("25:00"), None);
    }

    #[test]
    fn classify_collapses_unknown_to_none() {
        assert_eq!(classify_importance(&RawImportance::Stars(3)), Some(Importance::High));
        assert_eq!(classify_importance(&RawImportance::Stars(2)), Some(Importance::Medium));
        assert_eq!(classify_importance(&RawImportance::Stars(1)), None);
        assert_eq!(
            classify_importance(&RawImportance::Label("Holiday".into())),
            None
        );
        assert_eq!(classify_importance(&RawImportance::Missing), None);
    }
}
