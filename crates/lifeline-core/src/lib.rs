#![forbid(unsafe_code)]
//! lifeline-core library.
//!
//! Event model, fuzzy-date normalization, engine configuration and the
//! spatial index shared by the clustering and view crates.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums at library seams, each mapping to an
//!   [`error::ErrorCode`]; `anyhow::Result` for config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod spatial;
pub mod timing;

pub use config::EngineConfig;
pub use error::ErrorCode;
pub use model::{
    DataVersion, DateError, Event, EventId, EventInstant, FuzzyDate, GeoLocation, GeoPoint,
    Granularity, Season, SeasonStarts, TimeRange, ZoomTier,
};
pub use normalize::{
    Dataset, IngestError, IngestReport, NormalizedEvent, Normalizer, RawEvent, parse_instant,
};
