//! A checkpoint orchestrator for a transactional, page-oriented storage
//! engine: decides which trees participate in a checkpoint, retires
//! superseded named snapshots, and commits the new snapshot list to stable
//! metadata atomically with respect to concurrent readers and cursors.
//!
//! The orchestrator itself (`name`, `drop_planner`, `snapshot`,
//! `tree_checkpoint`, `database_checkpoint`, `tracker`) never touches disk;
//! it drives the [`collaborators::Collaborators`] / [`collaborators::Session`]
//! traits. [`engine::RocksEngine`] is the one concrete, RocksDB-backed
//! implementation, gated behind the `full` feature.

/// Error and Result types.
pub mod error;
/// Reserved-prefix validation for snapshot names.
pub mod name;
/// Drop directive interpretation over a tree's snapshot list.
pub mod drop_planner;
/// Snapshot entries and the in-memory, mutable snapshot list view.
pub mod snapshot;
/// The external interfaces the orchestrator drives but does not implement.
pub mod collaborators;
/// Per-call checkpoint configuration.
pub mod config;
/// Scoped recorder of reversible side effects (free-list resolution).
pub mod tracker;
/// The per-tree checkpoint pipeline.
pub mod tree_checkpoint;
/// The whole-database checkpoint driver.
pub mod database_checkpoint;

/// A RocksDB-backed `Collaborators`/`Session` implementation.
#[cfg(feature = "full")]
pub mod engine;

/// Test-only `TempEngine`/`CrashEngine` helpers built on `engine::RocksEngine`.
#[cfg(feature = "test-support")]
pub mod test_support;

#[cfg(feature = "full")]
pub use rocksdb;

pub use collaborators::{
    Collaborators, FlushMode, Isolation, IsolationGuard, LockOutcome, Session, TreeHandle, TreeRole,
};
pub use config::{CheckpointConfig, RawDropItem};
pub use database_checkpoint::database_checkpoint;
pub use drop_planner::{DropDirective, DropPlanner};
pub use error::{Error, Result};
pub use name::NameValidator;
pub use snapshot::{SnapshotEntry, SnapshotFlags, SnapshotList};
pub use tracker::MetaTracker;
pub use tree_checkpoint::{checkpoint_tree, CheckpointMode};

#[cfg(feature = "full")]
pub use engine::RocksEngine;
