//! Economic calendar digest — binary entrypoint.
//! Loads config, runs one digest under an optional watchdog, maps the result
//! to an exit code (0 ok/no-op, 1 failure, 2 watchdog).

use std::process::ExitCode;
use std::time::Duration;

use econ_calendar_digest::{CalendarConfig, Digest, RunOutcome};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXIT_FAILURE: u8 = 1;
const EXIT_WATCHDOG: u8 = 2;

/// Logs go to stderr so a dry run's stdout is just the report.
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("digest=info,ingest=info,fetch=info,econ_calendar=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match CalendarConfig::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "invalid configuration");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let digest = match Digest::from_config(&cfg) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "cannot build digest");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let run = digest.run(chrono::Utc::now());
    let result = match cfg.watchdog_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
            Ok(res) => res,
            Err(_) => {
                tracing::error!(secs, "watchdog expired, aborting run");
                return ExitCode::from(EXIT_WATCHDOG);
            }
        },
        None => run.await,
    };

    match result {
        Ok(RunOutcome::Skipped) => ExitCode::SUCCESS,
        Ok(RunOutcome::Sent { events, chars }) => {
            tracing::info!(events, chars, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
