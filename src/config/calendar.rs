// src/config/calendar.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};

use crate::country::TargetCountry;
use crate::fetch::{self, FetchClient, FetchPolicy};
use crate::ingest::providers::{json_feed, markup_table};
use crate::ingest::types::Importance;
use crate::localtime::{LocalCalendar, Locale, DEFAULT_TIMEZONE};
use crate::notify::telegram;
use crate::render;
use crate::window::DateOverride;

pub const ENV_CONFIG_PATH: &str = "CALENDAR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/calendar.toml";

/// Calendar sources, tried in the configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Feed,
    Markup,
}

impl SourceKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" | "json" | "ff" => Ok(SourceKind::Feed),
            "markup" | "html" | "widget" => Ok(SourceKind::Markup),
            other => bail!("unknown calendar source '{other}' (expected feed|markup)"),
        }
    }
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_impact_min() -> String {
    "medium".to_string()
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_sources() -> Vec<String> {
    vec!["feed".to_string(), "markup".to_string()]
}
fn default_feed_this_week() -> String {
    json_feed::DEFAULT_THIS_WEEK_URL.to_string()
}
fn default_feed_next_week() -> String {
    json_feed::DEFAULT_NEXT_WEEK_URL.to_string()
}
fn default_markup_url() -> String {
    markup_table::DEFAULT_MARKUP_URL.to_string()
}
fn default_widget_timezone() -> String {
    markup_table::DEFAULT_WIDGET_TIMEZONE.to_string()
}
fn default_lang() -> String {
    "en".to_string()
}
fn default_max_per_day() -> usize {
    render::DEFAULT_MAX_PER_DAY
}
fn default_char_budget() -> usize {
    render::DEFAULT_CHAR_BUDGET
}
fn default_timeout_ms() -> u64 {
    fetch::DEFAULT_TIMEOUT_MS
}
fn default_retries() -> u32 {
    fetch::DEFAULT_MAX_RETRIES
}
fn default_backoff_ms() -> u64 {
    fetch::DEFAULT_BACKOFF_BASE_MS
}
fn default_user_agent() -> String {
    fetch::DEFAULT_USER_AGENT.to_string()
}
fn default_telegram_api() -> String {
    telegram::DEFAULT_API_BASE.to_string()
}

/// Run configuration. Every field has a default; a TOML file and then the
/// environment override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub timezone: String,
    /// "medium" | "high"
    pub impact_min: String,
    pub force_date_from: Option<String>,
    pub force_date_to: Option<String>,
    pub block_weekends: bool,
    pub target_currency: String,
    pub sources: Vec<String>,
    pub feed_url_this_week: String,
    /// Empty disables the next-week feed.
    pub feed_url_next_week: String,
    pub markup_url: String,
    pub markup_widget_timezone: String,
    /// "en" | "es"
    pub report_lang: String,
    pub show_desc: bool,
    pub show_figures: bool,
    pub max_per_day: usize,
    pub char_budget: usize,
    pub fetch_timeout_ms: u64,
    pub fetch_retries: u32,
    pub fetch_backoff_ms: u64,
    pub fetch_user_agent: String,
    pub watchdog_secs: Option<u64>,
    pub dry_run: bool,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_base: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            impact_min: default_impact_min(),
            force_date_from: None,
            force_date_to: None,
            block_weekends: false,
            target_currency: default_currency(),
            sources: default_sources(),
            feed_url_this_week: default_feed_this_week(),
            feed_url_next_week: default_feed_next_week(),
            markup_url: default_markup_url(),
            markup_widget_timezone: default_widget_timezone(),
            report_lang: default_lang(),
            show_desc: false,
            show_figures: false,
            max_per_day: default_max_per_day(),
            char_budget: default_char_budget(),
            fetch_timeout_ms: default_timeout_ms(),
            fetch_retries: default_retries(),
            fetch_backoff_ms: default_backoff_ms(),
            fetch_user_agent: default_user_agent(),
            watchdog_secs: None,
            dry_run: false,
            telegram_token: None,
            telegram_chat_id: None,
            telegram_api_base: default_telegram_api(),
        }
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(key: &str, v: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    v.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("{key}={v:?} is not a valid number: {e}"))
}

impl CalendarConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing calendar config TOML")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading calendar config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load using env var + fallbacks, then apply env overrides and validate:
    /// 1) $CALENDAR_CONFIG_PATH (must exist)
    /// 2) config/calendar.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
                }
                Self::load_from(&pb)?
            }
            _ => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from(&default)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay environment values. Empty values count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|k| get(*k));

        // POSIX `TZ=:/etc/localtime` style values name a file, not a zone.
        if let Some(v) = get("TZ") {
            let tz = v.trim().trim_start_matches(':');
            if !tz.starts_with('/') {
                self.timezone = tz.to_string();
            }
        }
        if let Some(v) = get("IMPACT_MIN") {
            self.impact_min = v;
        }
        if let Some(v) = get("FORCE_DATE_FROM") {
            self.force_date_from = Some(v);
        }
        if let Some(v) = get("FORCE_DATE_TO") {
            self.force_date_to = Some(v);
        }
        if let Some(v) = get("BLOCK_WEEKENDS") {
            self.block_weekends = parse_flag(&v);
        }
        if let Some(v) = get("TARGET_CURRENCY") {
            self.target_currency = v;
        }
        if let Some(v) = get("CALENDAR_SOURCES") {
            self.sources = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("FEED_URL_THIS_WEEK") {
            self.feed_url_this_week = v;
        }
        if let Some(v) = lookup("FEED_URL_NEXT_WEEK") {
            self.feed_url_next_week = v.trim().to_string();
        }
        if let Some(v) = get("MARKUP_URL") {
            self.markup_url = v;
        }
        if let Some(v) = get("MARKUP_WIDGET_TZ") {
            self.markup_widget_timezone = v;
        }
        if let Some(v) = get("REPORT_LANG") {
            self.report_lang = v;
        }
        if let Some(v) = get("SHOW_DESC") {
            self.show_desc = parse_flag(&v);
        }
        if let Some(v) = get("SHOW_FIGURES") {
            self.show_figures = parse_flag(&v);
        }
        if let Some(v) = get("FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse_num("FETCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("FETCH_RETRIES") {
            self.fetch_retries = parse_num("FETCH_RETRIES", &v)?;
        }
        if let Some(v) = get("FETCH_BACKOFF_MS") {
            self.fetch_backoff_ms = parse_num("FETCH_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("FETCH_USER_AGENT") {
            self.fetch_user_agent = v.trim().to_string();
        }
        if let Some(v) = get("WATCHDOG_SECS") {
            let secs: u64 = parse_num("WATCHDOG_SECS", &v)?;
            self.watchdog_secs = (secs > 0).then_some(secs);
        }
        if let Some(v) = get("DRY_RUN") {
            self.dry_run = parse_flag(&v);
        }
        if let Some(v) = first(&["TELEGRAM_TOKEN", "INVESTX_TOKEN"]) {
            self.telegram_token = Some(v.trim().to_string());
        }
        if let Some(v) = first(&["TELEGRAM_CHAT_ID", "CHAT_ID"]) {
            self.telegram_chat_id = Some(v.trim().to_string());
        }
        if let Some(v) = get("TELEGRAM_API_BASE") {
            self.telegram_api_base = v;
        }
        Ok(())
    }

    /// Check every derived value once, so a bad setting fails before any fetch.
    pub fn validate(&self) -> Result<()> {
        self.calendar()?;
        self.min_importance()?;
        self.date_override()?;
        self.sources()?;
        self.locale()?;
        self.target()?;
        self.telegram_credentials()?;
        if self.max_per_day == 0 {
            bail!("max_per_day must be at least 1");
        }
        Ok(())
    }

    pub fn calendar(&self) -> Result<LocalCalendar> {
        LocalCalendar::parse(&self.timezone).context("TZ")
    }

    pub fn min_importance(&self) -> Result<Importance> {
        Importance::parse(&self.impact_min).context("IMPACT_MIN")
    }

    /// Both bounds or neither.
    pub fn date_override(&self) -> Result<Option<DateOverride>> {
        match (&self.force_date_from, &self.force_date_to) {
            (None, None) => Ok(None),
            (Some(from), Some(to)) => DateOverride::parse(from, to)
                .map(Some)
                .context("FORCE_DATE_FROM/FORCE_DATE_TO"),
            _ => bail!("FORCE_DATE_FROM and FORCE_DATE_TO must be set together"),
        }
    }

    pub fn sources(&self) -> Result<Vec<SourceKind>> {
        if self.sources.is_empty() {
            bail!("CALENDAR_SOURCES is empty");
        }
        let mut out = Vec::with_capacity(self.sources.len());
        for s in &self.sources {
            let kind = SourceKind::parse(s)?;
            if !out.contains(&kind) {
                out.push(kind);
            }
        }
        Ok(out)
    }

    pub fn locale(&self) -> Result<Locale> {
        Locale::parse(&self.report_lang).context("REPORT_LANG")
    }

    pub fn target(&self) -> Result<TargetCountry> {
        TargetCountry::from_currency(&self.target_currency).context("TARGET_CURRENCY")
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy::from_millis(self.fetch_timeout_ms, self.fetch_retries, self.fetch_backoff_ms)
    }

    /// Shared client for the calendar sources.
    pub fn fetch_client(&self) -> FetchClient {
        FetchClient::new(self.fetch_policy()).with_user_agent(self.fetch_user_agent.clone())
    }

    /// Token and chat id. `None` in dry-run mode; missing values are an error otherwise.
    pub fn telegram_credentials(&self) -> Result<Option<(String, String)>> {
        if self.dry_run {
            return Ok(None);
        }
        match (&self.telegram_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Ok(Some((token.clone(), chat.clone()))),
            _ => bail!("TELEGRAM_TOKEN and TELEGRAM_CHAT_ID are required unless DRY_RUN=1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_usable_in_dry_run() {
        let cfg = CalendarConfig {
            dry_run: true,
            ..CalendarConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.calendar().unwrap().name(), "Europe/Madrid");
        assert_eq!(cfg.min_importance().unwrap(), Importance::Medium);
        assert_eq!(cfg.sources().unwrap(), vec![SourceKind::Feed, SourceKind::Markup]);
        assert_eq!(cfg.fetch_policy(), FetchPolicy::default());
        assert!(cfg.date_override().unwrap().is_none());
    }

    #[test]
    fn toml_fills_only_given_fields() {
        let cfg = CalendarConfig::from_toml_str(
            r#"
            timezone = "America/New_York"
            impact_min = "high"
            sources = ["markup"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.min_importance().unwrap(), Importance::High);
        assert_eq!(cfg.sources().unwrap(), vec![SourceKind::Markup]);
        assert_eq!(cfg.target_currency, "USD");
        assert_eq!(cfg.char_budget, render::DEFAULT_CHAR_BUDGET);
    }

    #[test]
    fn env_overrides_and_aliases() {
        let mut cfg = CalendarConfig::default();
        cfg.apply_env(env(&[
            ("TZ", "UTC"),
            ("BLOCK_WEEKENDS", "1"),
            ("CALENDAR_SOURCES", "markup, feed"),
            ("INVESTX_TOKEN", "t0k"),
            ("CHAT_ID", "-100"),
            ("FETCH_RETRIES", "4"),
            ("SHOW_DESC", "true"),
            ("DRY_RUN", ""),
        ]))
        .unwrap();
        assert!(cfg.block_weekends);
        assert!(cfg.show_desc);
        assert!(!cfg.dry_run);
        assert_eq!(cfg.sources().unwrap(), vec![SourceKind::Markup, SourceKind::Feed]);
        assert_eq!(
            cfg.telegram_credentials().unwrap(),
            Some(("t0k".to_string(), "-100".to_string()))
        );
        assert_eq!(cfg.fetch_policy().max_retries, 4);
        cfg.validate().unwrap();
    }

    #[test]
    fn primary_credential_names_win_over_aliases() {
        let mut cfg = CalendarConfig::default();
        cfg.apply_env(env(&[("TELEGRAM_TOKEN", "a"), ("INVESTX_TOKEN", "b"), ("TELEGRAM_CHAT_ID", "1")]))
            .unwrap();
        assert_eq!(cfg.telegram_token.as_deref(), Some("a"));
    }

    fn rejected(pairs: &[(&str, &str)]) -> bool {
        let mut cfg = CalendarConfig {
            dry_run: true,
            ..CalendarConfig::default()
        };
        cfg.apply_env(env(pairs)).and_then(|_| cfg.validate()).is_err()
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(rejected(&[("TZ", "Mars/Olympus")]));
        assert!(rejected(&[("IMPACT_MIN", "low")]));
        assert!(rejected(&[("FORCE_DATE_FROM", "2025-03-06")]));
        assert!(rejected(&[("FORCE_DATE_FROM", "2025-03-11"), ("FORCE_DATE_TO", "2025-03-06")]));
        assert!(rejected(&[("CALENDAR_SOURCES", "feed,rss")]));
        assert!(rejected(&[("FETCH_TIMEOUT_MS", "soon")]));
        assert!(rejected(&[("TARGET_CURRENCY", "XYZ")]));
        assert!(!rejected(&[("FORCE_DATE_FROM", "2025-03-06"), ("FORCE_DATE_TO", "2025-03-11")]));
    }

    #[test]
    fn zero_per_day_cap_is_rejected() {
        let cfg = CalendarConfig::from_toml_str("max_per_day = 0\ndry_run = true\n").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_per_day"), "{err}");
        let one = CalendarConfig::from_toml_str("max_per_day = 1\ndry_run = true\n").unwrap();
        one.validate().unwrap();
    }

    #[test]
    fn user_agent_and_posix_tz_from_env() {
        let mut cfg = CalendarConfig::default();
        assert_eq!(cfg.fetch_user_agent, fetch::DEFAULT_USER_AGENT);
        cfg.apply_env(env(&[("FETCH_USER_AGENT", "calendar-bot/2"), ("TZ", ":/etc/localtime")]))
            .unwrap();
        assert_eq!(cfg.fetch_user_agent, "calendar-bot/2");
        assert_eq!(cfg.timezone, DEFAULT_TIMEZONE);
    }

    #[test]
    fn credentials_required_outside_dry_run() {
        let cfg = CalendarConfig::default();
        assert!(cfg.telegram_credentials().is_err());
    }
}
