// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod country;
pub mod digest;
pub mod errors;
pub mod fetch;
pub mod ingest;
pub mod localtime;
pub mod notify;
pub mod render;
pub mod window;

// ---- Re-exports for stable public API ----
pub use crate::config::CalendarConfig;
pub use crate::digest::{Digest, Report, RunOutcome};
pub use crate::errors::DigestError;
pub use crate::ingest::types::{Event, Importance};
pub use crate::window::ReportWindow;
