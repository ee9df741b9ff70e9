//! # docdex
//!
//! An asynchronous document indexing and retrieval pipeline for AI
//! question answering.
//!
//! Documents are split into overlapping chunks, embedded via an external
//! embedding service, and stored in a SQLite-backed vector index scoped
//! by owner. Questions are answered by similarity search over the
//! owner's chunks plus an external generation service, with a
//! three-level cache in front of the expensive stages and an in-memory
//! progress tracker for polling long-running indexing jobs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Extracted  │──▶│   Indexing    │──▶│  SQLite    │
//! │   text     │   │ Chunk+Embed  │   │  vectors   │
//! └────────────┘   └──────┬───────┘   └─────┬─────┘
//!                         │                 │
//!                  ProgressTracker    similarity search
//!                         │                 │
//!                    poll status      ┌─────▼─────┐   ┌────────────┐
//!                                     │ Retrieval │──▶│ Generation │
//!                                     │  (cached) │   │  service   │
//!                                     └───────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding client abstraction |
//! | [`generation`] | Generation client abstraction |
//! | [`cache`] | Embedding / search / answer caches |
//! | [`store`] | Vector store trait and backends |
//! | [`documents`] | Document persistence boundary |
//! | [`progress`] | Indexing-job progress tracker |
//! | [`index`] | Indexing orchestrator (write path) |
//! | [`query`] | Retrieval orchestrator (read path) |
//! | [`service`] | Facade exposed to the API layer |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod chunk;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod query;
pub mod service;
pub mod store;

pub use error::{DocdexError, Result};
pub use service::IndexService;
