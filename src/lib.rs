//! curator: ingestion and analysis job pipeline for research transcripts.
//!
//! Documents are chunked into sentence-aligned windows, embedded in
//! rate-limited batches, and persisted alongside a SQLite-backed job queue.
//! Workers claim jobs atomically and are safe to run concurrently.

pub mod blob;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod limiter;
pub mod llm;
pub mod queue;
pub mod server;
pub mod store;
pub mod worker;
