use anyhow::{anyhow, Context, Result};
use reqwest::header;
use serde::Deserialize;

use super::Notifier;
use crate::fetch::{FetchClient, FetchPolicy, FetchRequest};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API `sendMessage` with HTML parse mode. A single attempt: a duplicate
/// report is worse than a missing one.
#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    api_base: String,
    client: FetchClient,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>, policy: FetchPolicy) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: FetchClient::new(FetchPolicy {
                max_retries: 0,
                ..policy
            }),
        }
    }

    /// Point at another Bot API host (tests, self-hosted API servers).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let req = FetchRequest::post_form(
            self.endpoint(),
            [
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
                ("disable_web_page_preview", "true"),
            ],
        )
        .header(header::ACCEPT, "application/json")
        .redacted(format!("{}/bot***/sendMessage", self.api_base));

        // The token is part of the URL; keep it out of the error chain.
        let body = self.client.fetch_text(&req).await.map_err(|e| match e {
            crate::fetch::FetchError::Status { status, excerpt, .. } => {
                anyhow!("telegram sendMessage HTTP {status}: {excerpt}")
            }
            crate::fetch::FetchError::Timeout { timeout_ms, .. } => {
                anyhow!("telegram sendMessage timed out after {timeout_ms} ms")
            }
            other => anyhow!("telegram sendMessage failed: {}", other.to_string().replace(&self.token, "***")),
        })?;

        let reply: ApiReply = serde_json::from_str(&body).context("telegram reply is not JSON")?;
        if !reply.ok {
            return Err(anyhow!(
                "telegram rejected message: {}",
                reply.description.unwrap_or_else(|| "no description".into())
            ));
        }
        tracing::info!(target: "digest", chars = text.chars().count(), "telegram message sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
