// src/digest.rs
//! One run: window -> sources -> normalize -> render -> deliver.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::{CalendarConfig, SourceKind};
use crate::country::TargetCountry;
use crate::errors::DigestError;
use crate::ingest;
use crate::ingest::normalize::{NormalizeOptions, NormalizeStats};
use crate::ingest::providers::json_feed::WeeklyFeedProvider;
use crate::ingest::providers::markup_table::MarkupTableProvider;
use crate::ingest::types::{Event, Importance, SourceProvider};
use crate::localtime::LocalCalendar;
use crate::notify::{Notifier, StdoutNotifier, TelegramNotifier};
use crate::render::Renderer;
use crate::window::{DateOverride, ReportWindow, WindowResolver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Weekend with weekend blocking on; nothing fetched or sent.
    Skipped,
    Sent { events: usize, chars: usize },
}

/// A rendered report, before delivery.
#[derive(Debug, Clone)]
pub struct Report {
    pub window: ReportWindow,
    pub events: Vec<Event>,
    pub stats: NormalizeStats,
    pub text: String,
}

pub struct Digest {
    resolver: WindowResolver,
    date_override: Option<DateOverride>,
    providers: Vec<Box<dyn SourceProvider>>,
    min_importance: Importance,
    normalize: NormalizeOptions,
    renderer: Renderer,
    calendar: LocalCalendar,
    target: TargetCountry,
    notifier: Box<dyn Notifier>,
}

impl Digest {
    pub fn from_config(cfg: &CalendarConfig) -> Result<Self> {
        let calendar = cfg.calendar()?;
        let locale = cfg.locale()?;
        let target = cfg.target()?;
        let min_importance = cfg.min_importance()?;
        let client = cfg.fetch_client();

        let providers = cfg
            .sources()?
            .into_iter()
            .map(|kind| -> Box<dyn SourceProvider> {
                match kind {
                    SourceKind::Feed => Box::new(WeeklyFeedProvider::new(
                        client.clone(),
                        cfg.feed_url_this_week.clone(),
                        (!cfg.feed_url_next_week.is_empty()).then(|| cfg.feed_url_next_week.clone()),
                        target.clone(),
                        calendar,
                    )),
                    SourceKind::Markup => Box::new(
                        MarkupTableProvider::new(
                            client.clone(),
                            cfg.markup_url.clone(),
                            &target,
                            locale,
                            min_importance,
                        )
                        .with_widget_timezone(cfg.markup_widget_timezone.clone()),
                    ),
                }
            })
            .collect();

        let notifier: Box<dyn Notifier> = match cfg.telegram_credentials()? {
            Some((token, chat_id)) => Box::new(
                TelegramNotifier::new(token, chat_id, cfg.fetch_policy())
                    .with_api_base(cfg.telegram_api_base.clone()),
            ),
            None => Box::new(StdoutNotifier),
        };

        Ok(Self {
            resolver: WindowResolver::new(calendar)
                .skip_weekends(cfg.block_weekends)
                .locale(locale),
            date_override: cfg.date_override()?,
            providers,
            min_importance,
            normalize: NormalizeOptions {
                calendar,
                locale,
                with_descriptions: cfg.show_desc,
                ..NormalizeOptions::default()
            },
            renderer: Renderer {
                max_per_day: cfg.max_per_day,
                char_budget: cfg.char_budget,
                locale,
                show_figures: cfg.show_figures,
            },
            calendar,
            target,
            notifier,
        })
    }

    /// Replace the delivery endpoint chosen from config.
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Build the report for `now`. `None` when the run is a weekend no-op.
    pub async fn build_report(&self, now: DateTime<Utc>) -> Result<Option<Report>, DigestError> {
        let Some(window) = self.resolver.resolve(now, self.date_override) else {
            return Ok(None);
        };
        tracing::info!(
            target: "digest",
            from = %window.from_date,
            to = %window.to_date,
            weekly = window.is_weekly,
            label = %window.header_label,
            "window resolved"
        );

        let (events, stats) =
            ingest::run_once(&self.providers, &window, now, self.min_importance, self.normalize).await?;

        let text = self
            .renderer
            .render(&events, &window, self.calendar.name(), self.target.flag);
        Ok(Some(Report {
            window,
            events,
            stats,
            text,
        }))
    }

    /// Build and deliver. Delivery errors are not retried.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunOutcome, DigestError> {
        let Some(report) = self.build_report(now).await? else {
            return Ok(RunOutcome::Skipped);
        };
        let chars = report.text.chars().count();
        self.notifier
            .send(&report.text)
            .await
            .map_err(|source| DigestError::Delivery {
                notifier: self.notifier.name(),
                source,
            })?;
        tracing::info!(target: "digest", notifier = self.notifier.name(), events = report.events.len(), chars, "report delivered");
        Ok(RunOutcome::Sent {
            events: report.events.len(),
            chars,
        })
    }
}
