use thiserror::Error;

/// Failures that end a run with a non-zero exit.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("no calendar source produced usable data (tried: {})", .tried.join(", "))]
    SourcesExhausted { tried: Vec<String> },
    #[error("delivery via {notifier} failed: {source:#}")]
    Delivery {
        notifier: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
