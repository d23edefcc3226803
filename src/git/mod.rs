//! Version control integration.
//!
//! A trait-based interface over `git2`, kept narrow to what the
//! workspace mutator and agent runner actually need.

pub mod adapter;

pub use adapter::{CommitOutcome, CommitResult, Git2Vcs, Vcs, VcsMode};
