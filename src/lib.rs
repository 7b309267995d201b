//! # ticker-metrics
//!
//! Daily technical and valuation metrics for a single equity ticker.
//!
//! The crate takes a raw bundle of daily closes and quarterly fundamentals,
//! derives strict-window moving averages, the 52-week high, book value per
//! share, price/book and enterprise value, detects golden and death crosses,
//! and hands both the metrics and the events to SQLite and JSON collaborators.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ticker_metrics::prelude::*;
//!
//! # fn main() -> ticker_metrics::error::Result<()> {
//! let source = CsvSource::new("prices.csv");
//! let bundle = fetch_raw_bundle(&source, "AAPL", HistoryPeriod::Years(5), &RetryPolicy::default())?;
//!
//! let output = process_bundle(&bundle, &PipelineConfig::default())?;
//! let (events, _contexts) = detect_crossovers(&bundle.ticker, &output.rows);
//! for event in &events {
//!     println!("{} on {}", event.kind, event.date);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod export;
pub mod fundamentals;
pub mod pipeline;
pub mod ratios;
pub mod rolling;
pub mod signals;
pub mod sources;
#[cfg(feature = "rusqlite-support")]
pub mod storage;
pub mod types;

pub mod prelude {
    //! Commonly used types and functions
    pub use crate::error::{MetricsError, Result};
    pub use crate::export::{ExportNotes, ExportPayload};
    pub use crate::pipeline::{is_short_history, process_bundle, MetricsRow, PipelineConfig, PipelineOutput};
    pub use crate::signals::{detect_crossovers, CrossState, CrossoverContext, CrossoverDetector};
    pub use crate::sources::{fetch_raw_bundle, CsvSource, HistoryPeriod, MarketDataProvider, RetryPolicy};
    #[cfg(feature = "rusqlite-support")]
    pub use crate::storage::MetricsStore;
    pub use crate::types::*;
}
