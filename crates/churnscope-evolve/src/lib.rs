//! Change-evolution tracking and aggregation over mined metrics.
//!
//! Consumes the per-commit analyzer output produced by the mining stage,
//! deduplicates each entity's consecutive identical metric vectors into a
//! timeline, and ranks entities by how often their design metrics
//! changed across the project's history.

pub mod parser;
pub mod pipeline;
pub mod stats;
pub mod tracker;
