//! # Quarry
//!
//! A local, single-user knowledge retrieval engine.
//!
//! Quarry ingests free-form text documents and scripts, splits them into
//! retrievable chunks, embeds and scores them against queries, and
//! maintains a navigable link graph between documents and chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌──────────┐
//! │  Files/Text  │──▶│  Ingest Pipeline   │──▶│  SQLite   │
//! │  (md, txt)   │   │ Chunk+Link+Embed  │   │ Vec+Graph │
//! └──────────────┘   └───────────────────┘   └────┬─────┘
//!                                                 │
//!                                                 ▼
//!                                           ┌──────────┐
//!                                           │   CLI    │
//!                                           │ (quarry) │
//!                                           └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! quarry init                          # create database
//! quarry ingest ./docs                 # ingest a directory
//! quarry search "tls handshake"        # hybrid retrieval
//! quarry related <id> --depth 2        # walk the link graph
//! quarry stats                         # what's indexed
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`tokens`] | Token estimation |
//! | [`chunk`] | Chunking engine (strategies + post-processing) |
//! | [`links`] | Link extraction and fragment matching |
//! | [`score`] | Hybrid scoring engine |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ingest`] | Ingestion pipeline and link resolution |
//! | [`search`] | Retrieval orchestrator |
//! | [`related`] | Bounded-depth graph traversal |
//! | [`get`] | Document retrieval by id |
//! | [`remove`] | Document removal |
//! | [`stats`] | Store statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod links;
pub mod migrate;
pub mod models;
pub mod related;
pub mod remove;
pub mod score;
pub mod search;
pub mod stats;
pub mod tokens;
