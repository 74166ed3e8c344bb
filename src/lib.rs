//! Core ingestion-and-query engine for the trip telemetry service.
//! The process bootstrap and CLI parsing live in `src/bin/`; this
//! library is the framed protocol, the relational store, the query
//! dispatcher, the id allocator, and the single-threaded event loop
//! that ties them together.

pub mod codec;
pub mod config;
pub mod error;
pub mod ids;
pub mod ingest;
pub mod query;
pub mod server;
pub mod session;
pub mod store;
