//! Session telemetry: events, the append-only logger, derived summaries and
//! export.

pub mod event;
pub mod export;
pub mod logger;
pub mod summary;

pub use event::{excerpt, input_digest, EventKind, TelemetryEvent, EXCERPT_CHARS};
pub use export::{write_csv, HttpSessionExporter};
pub use logger::TelemetryLogger;
pub use summary::{summarize, SessionSummary};
