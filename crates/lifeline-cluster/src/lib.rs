#![forbid(unsafe_code)]
//! lifeline-cluster library.
//!
//! Groups a normalized [`lifeline_core::Dataset`] into clusters at every zoom
//! tier and links them into a nested [`ClusterTree`].
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums mapping to [`lifeline_core::ErrorCode`];
//!   nesting defects are repaired and recorded, never returned.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod cluster;
pub mod spatial;
pub mod temporal;
pub mod tree;
pub mod verify;

pub use cluster::{BurstRule, Cluster, ClusterId, ClusterType};
pub use tree::{
    BuildError, Cancellation, ClusterTree, NestingRepair, TierLevel, TierStats, TreeBuilder,
    Uncancellable,
};
pub use verify::{Violation, verify_tree};
