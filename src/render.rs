// src/render.rs
//! Day-grouped digest text in the Telegram HTML subset.

use chrono::NaiveDate;

use crate::ingest::types::Event;
use crate::localtime::{format_day, Locale};
use crate::window::ReportWindow;

pub const DEFAULT_MAX_PER_DAY: usize = 5;
/// Telegram caps messages at 4096 chars; leave room for entities.
pub const DEFAULT_CHAR_BUDGET: usize = 3_900;
/// Smallest budget accepted; below this even a short report cannot fit.
pub const MIN_CHAR_BUDGET: usize = 512;

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    pub max_per_day: usize,
    pub char_budget: usize,
    pub locale: Locale,
    pub show_figures: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            max_per_day: DEFAULT_MAX_PER_DAY,
            char_budget: DEFAULT_CHAR_BUDGET,
            locale: Locale::En,
            show_figures: false,
        }
    }
}

struct Phrases {
    title: &'static str,
    legend: &'static str,
    no_events: &'static str,
    more: &'static str,
    truncated: &'static str,
    forecast: &'static str,
    previous: &'static str,
}

const EN: Phrases = Phrases {
    title: "Economic Calendar",
    legend: "Impact: ⭐⭐ medium · ⭐⭐⭐ high",
    no_events: "No relevant events for this period.",
    more: "more…",
    truncated: "…truncated",
    forecast: "est",
    previous: "prev",
};

const ES: Phrases = Phrases {
    title: "Calendario económico",
    legend: "Impacto: ⭐⭐ medio · ⭐⭐⭐ alto",
    no_events: "No hay eventos relevantes para este periodo.",
    more: "más…",
    truncated: "…recortado",
    forecast: "prev",
    previous: "ant",
};

impl Renderer {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            ..Self::default()
        }
    }

    pub fn with_figures(mut self, on: bool) -> Self {
        self.show_figures = on;
        self
    }

    pub fn with_budget(mut self, chars: usize) -> Self {
        self.char_budget = chars;
        self
    }

    fn phrases(&self) -> &'static Phrases {
        match self.locale {
            Locale::En => &EN,
            Locale::Es => &ES,
        }
    }

    /// Render `events` (already sorted) for `window`. The result never exceeds
    /// the effective budget and always starts with the full header block.
    pub fn render(&self, events: &[Event], window: &ReportWindow, tz_name: &str, flag: &str) -> String {
        let p = self.phrases();
        let header = vec![
            format!(
                "🗓️ <b>{} ({})</b> — {} ({})",
                p.title,
                flag,
                html_escape::encode_text(&window.header_label),
                tz_name
            ),
            p.legend.to_string(),
        ];

        let mut body = Vec::new();
        if events.is_empty() {
            body.push(String::new());
            body.push(p.no_events.to_string());
        } else {
            for (date, day_events) in group_by_day(events) {
                body.push(String::new());
                body.push(format!(
                    "<b>{} {}</b>",
                    day_events[0].weekday_label,
                    format_day(date)
                ));
                let shown = if window.is_weekly {
                    self.max_per_day.min(day_events.len())
                } else {
                    day_events.len()
                };
                for ev in &day_events[..shown] {
                    self.push_event(&mut body, ev);
                }
                let hidden = day_events.len() - shown;
                if hidden > 0 {
                    body.push(format!("  +{hidden} {}", p.more));
                }
            }
        }

        fit_to_budget(&header, &body, p.truncated, self.char_budget)
    }

    fn push_event(&self, out: &mut Vec<String>, ev: &Event) {
        let p = self.phrases();
        let mut line = format!(
            "• {} — {} — {}",
            ev.local_time,
            ev.importance.stars(),
            html_escape::encode_text(&ev.title)
        );
        if self.show_figures {
            let figures: Vec<String> = [(p.forecast, &ev.forecast), (p.previous, &ev.previous)]
                .into_iter()
                .filter_map(|(label, v)| {
                    v.as_deref()
                        .filter(|s| !s.trim().is_empty())
                        .map(|s| format!("{label}: {}", html_escape::encode_text(s.trim())))
                })
                .collect();
            if !figures.is_empty() {
                line.push_str(&format!(" ({})", figures.join(" · ")));
            }
        }
        out.push(line);
        if let Some(desc) = &ev.description {
            out.push(format!("  · {}", html_escape::encode_text(desc)));
        }
    }
}

/// Days in first-seen order, each with its events in input order.
fn group_by_day(events: &[Event]) -> Vec<(NaiveDate, Vec<&Event>)> {
    let mut days: Vec<(NaiveDate, Vec<&Event>)> = Vec::new();
    for ev in events {
        match days.iter_mut().find(|(d, _)| *d == ev.local_date) {
            Some((_, list)) => list.push(ev),
            None => days.push((ev.local_date, vec![ev])),
        }
    }
    days
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Join header and body; if too long, drop whole trailing body lines and end
/// with `marker`. Header lines are never dropped.
fn fit_to_budget(header: &[String], body: &[String], marker: &str, budget: usize) -> String {
    let head = header.join("\n");
    let budget = budget
        .max(MIN_CHAR_BUDGET)
        .max(char_len(&head) + 2 + char_len(marker));

    let full_len = char_len(&head) + body.iter().map(|l| 1 + char_len(l)).sum::<usize>();
    if full_len <= budget {
        let mut out = head;
        for l in body {
            out.push('\n');
            out.push_str(l);
        }
        return out;
    }

    let reserve = 1 + char_len(marker);
    let mut kept: Vec<&str> = Vec::new();
    let mut used = char_len(&head);
    for l in body {
        let cost = 1 + char_len(l);
        if used + cost + reserve > budget {
            break;
        }
        used += cost;
        kept.push(l);
    }
    while kept.last().is_some_and(|l| l.is_empty()) {
        kept.pop();
    }

    tracing::warn!(target: "digest", budget, full_len, kept = kept.len(), dropped = body.len() - kept.len(), "report truncated");

    let mut out = head;
    for l in kept {
        out.push('\n');
        out.push_str(l);
    }
    out.push('\n');
    out.push_str(marker);
    out
}
