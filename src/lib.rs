//! Partition-aware stream processing with persisted, resumable progress.
//!
//! A stream processor consumes a (possibly filtered) stream of an append-only
//! event log for one tenant. Its progress is an immutable state snapshot that
//! is persisted after every transition, so a restarted processor resumes where
//! it left off. Partitioned processors keep failing partitions aside and catch
//! them up independently; an operator can skip past work that never succeeds.

pub mod app;
pub mod config;
pub mod domain;
pub mod engine;
pub mod prelude;
pub mod remote;
pub mod state;
pub mod storage;
pub mod streaming;
