#![forbid(unsafe_code)]
//! lifeline-view library.
//!
//! Turns a [`lifeline_cluster::ClusterTree`] and a viewport into the render
//! nodes a timeline UI draws, and keeps the tree fresh in the background.
//!
//! # Conventions
//!
//! - **Errors**: nothing on the interactive path fails; staleness is logged
//!   and served. Setup uses `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod aggregate;
pub mod debounce;
pub mod engine;
pub mod node;
pub mod rebuild;
pub mod viewport;

pub use aggregate::{Aggregator, NoRebuild, RebuildTrigger, VisibleNodes};
pub use debounce::Debouncer;
pub use engine::Timeline;
pub use node::{ClusterNode, EventNode, Geometry, RenderNode};
pub use rebuild::{RebuildCompleted, RebuildRequester, RebuildWorker, TreeHandle};
pub use viewport::{ViewportController, ViewportState};
