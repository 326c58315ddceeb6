//! Core types, configuration, and error handling for churnscope.
//!
//! This crate provides the shared foundation used by the mining and
//! evolution crates:
//! - [`ChurnError`] — unified error type using `thiserror`
//! - [`ChurnConfig`] — configuration loaded from `.churnscope.toml`
//! - Shared types: [`EntityId`], [`MetricVector`], [`CommitMeta`],
//!   [`MetricSnapshot`], [`EntityEvolution`], [`EntityMode`]

mod config;
mod error;
pub mod table;
mod types;

pub use config::{
    AnalyzerConfig, ChurnConfig, EvolutionConfig, MiningConfig, PathsConfig, RepoSpec,
};
pub use error::ChurnError;
pub use types::{
    commit_dir_name, short_hash, ClassKind, CommitMeta, EntityEvolution, EntityId, EntityMode,
    MetricSnapshot, MetricVector, TimelinePoint, COMMIT_LIST_FILE, COMMIT_LIST_HEADER,
};

/// A convenience `Result` type for churnscope operations.
pub type Result<T> = std::result::Result<T, ChurnError>;
