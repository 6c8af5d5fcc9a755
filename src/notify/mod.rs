// src/notify/mod.rs
pub mod telegram;

use anyhow::Result;

pub use telegram::TelegramNotifier;

/// Delivery endpoint for a finished report.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Dry-run sink: prints the report instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutNotifier;

#[async_trait::async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        println!("{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}
