//! Resumable commit-history mining.
//!
//! Walks a repository's commit sequence oldest-first using git2, writes
//! per-commit diff artifacts, checks out each commit, and runs an external
//! metrics analyzer against the checked-out tree. A per-repository
//! checkpoint file makes multi-thousand-commit traversals survive
//! interruption; a bounded worker pool mines several repositories at once.

pub mod analyzer;
pub mod checkpoint;
pub mod coordinator;
pub mod repo;
pub mod traversal;
