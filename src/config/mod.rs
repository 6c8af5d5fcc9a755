// src/config/mod.rs
pub mod calendar;

pub use calendar::{CalendarConfig, SourceKind};
