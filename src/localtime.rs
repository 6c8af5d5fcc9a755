// src/localtime.rs
//! Local calendar view. Every date/time shown or compared anywhere in the crate
//! goes through [`LocalCalendar`], so day boundaries are always those of the
//! configured timezone and never the host's.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";

/// Language of the rendered report (labels, weekday names, title translation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "en" | "english" => Ok(Locale::En),
            "es" | "spanish" | "español" => Ok(Locale::Es),
            other => Err(anyhow!("unsupported report language: {other}")),
        }
    }

    /// Weekday name for `iso_index` (Monday = 1 .. Sunday = 7).
    pub fn weekday_name(self, iso_index: u32) -> &'static str {
        const EN: [&str; 7] = [
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thursday",
            "Friday",
            "Saturday",
            "Sunday",
        ];
        const ES: [&str; 7] = [
            "Lunes",
            "Martes",
            "Miércoles",
            "Jueves",
            "Viernes",
            "Sábado",
            "Domingo",
        ];
        let i = (iso_index.clamp(1, 7) - 1) as usize;
        match self {
            Locale::En => EN[i],
            Locale::Es => ES[i],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCalendar {
    tz: Tz,
}

impl Default for LocalCalendar {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Europe::Madrid,
        }
    }
}

impl LocalCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn parse(name: &str) -> Result<Self> {
        let tz: Tz = name
            .trim()
            .parse()
            .map_err(|e| anyhow!("unknown timezone '{name}': {e}"))?;
        Ok(Self { tz })
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date_naive()
    }

    /// `HH:MM` in the configured timezone; zero-padded so it sorts lexically.
    pub fn time_of(&self, instant: DateTime<Utc>) -> String {
        self.local(instant).format("%H:%M").to_string()
    }

    /// Monday = 1 .. Sunday = 7.
    pub fn weekday_index(date: NaiveDate) -> u32 {
        date.weekday().number_from_monday()
    }

    /// Most recent Monday on or before `date`; never moves forward.
    pub fn week_start(date: NaiveDate) -> NaiveDate {
        let idx = Self::weekday_index(date) as i64;
        let offset = if idx == 1 { 0 } else { 1 - idx };
        date + Duration::days(offset)
    }

    pub fn is_weekend(date: NaiveDate) -> bool {
        Self::weekday_index(date) >= 6
    }

    /// Resolve a wall-clock date+time in the configured zone to an instant.
    /// Ambiguous times (DST fall-back) take the earlier instant; times inside a
    /// spring-forward gap are shifted one hour later.
    pub fn resolve_local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.resolve_naive(NaiveDateTime::new(date, time))
    }

    pub fn resolve_naive(&self, ndt: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&ndt)
            .earliest()
            .or_else(|| self.tz.from_local_datetime(&(ndt + Duration::hours(1))).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// `dd/mm/yyyy`, the day format used in report headers and day titles.
pub fn format_day(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
