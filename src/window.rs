// src/window.rs
//! Reporting window: which calendar dates a single run covers.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::localtime::{format_day, LocalCalendar, Locale};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Daily,
    Weekly,
    Custom,
}

/// Explicit `from..=to` range supplied by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOverride {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateOverride {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            bail!("override range is inverted: {from} > {to}");
        }
        Ok(Self { from, to })
    }

    pub fn parse(from: &str, to: &str) -> Result<Self> {
        let f = NaiveDate::parse_from_str(from.trim(), "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("invalid override start '{from}': {e}"))?;
        let t = NaiveDate::parse_from_str(to.trim(), "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("invalid override end '{to}': {e}"))?;
        Self::new(f, t)
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }
}

/// Computed once per run; immutable afterwards. `from_date <= to_date` always.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWindow {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub is_weekly: bool,
    pub header_label: String,
    pub kind: WindowKind,
}

impl ReportWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from_date <= date && date <= self.to_date
    }

    /// True when the window shares at least one day with `from..=to`.
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.from_date <= to && from <= self.to_date
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowResolver {
    pub calendar: LocalCalendar,
    pub skip_weekends: bool,
    pub locale: Locale,
}

impl WindowResolver {
    pub fn new(calendar: LocalCalendar) -> Self {
        Self {
            calendar,
            skip_weekends: false,
            locale: Locale::default(),
        }
    }

    pub fn skip_weekends(mut self, on: bool) -> Self {
        self.skip_weekends = on;
        self
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// `None` means "nothing to report today" (weekend policy), which callers
    /// treat as a successful no-op. An override always yields a window.
    pub fn resolve(&self, now: DateTime<Utc>, over: Option<DateOverride>) -> Option<ReportWindow> {
        if over.is_none() && self.skip_weekends {
            let today = self.calendar.date_of(now);
            if LocalCalendar::is_weekend(today) {
                tracing::info!(target: "digest", %today, tz = self.calendar.name(), "weekend, no window");
                return None;
            }
        }
        Some(self.compute(now, over))
    }

    fn compute(&self, now: DateTime<Utc>, over: Option<DateOverride>) -> ReportWindow {
        if let Some(o) = over {
            return self.custom(o);
        }

        let today = self.calendar.date_of(now);
        if LocalCalendar::weekday_index(today) == 1 {
            let monday = LocalCalendar::week_start(today);
            let sunday = monday + Duration::days(6);
            let prefix = match self.locale {
                Locale::En => "Week",
                Locale::Es => "Semana",
            };
            ReportWindow {
                from_date: monday,
                to_date: sunday,
                is_weekly: true,
                header_label: format!("{prefix} {}–{}", format_day(monday), format_day(sunday)),
                kind: WindowKind::Weekly,
            }
        } else {
            let prefix = match self.locale {
                Locale::En => "Today",
                Locale::Es => "Hoy",
            };
            ReportWindow {
                from_date: today,
                to_date: today,
                is_weekly: false,
                header_label: format!("{prefix} {}", format_day(today)),
                kind: WindowKind::Daily,
            }
        }
    }

    fn custom(&self, o: DateOverride) -> ReportWindow {
        let prefix = match self.locale {
            Locale::En => "Range",
            Locale::Es => "Rango",
        };
        ReportWindow {
            from_date: o.from,
            to_date: o.to,
            // Multi-day ranges are laid out like a week.
            is_weekly: o.from != o.to,
            header_label: format!("{prefix} {}→{}", o.from, o.to),
            kind: WindowKind::Custom,
        }
    }
}

/// Default policy (weekends allowed, English labels).
pub fn resolve_window(now: DateTime<Utc>, tz: Tz, over: Option<DateOverride>) -> ReportWindow {
    WindowResolver::new(LocalCalendar::new(tz)).compute(now, over)
}
