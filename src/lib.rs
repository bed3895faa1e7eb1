//! # ipfs-search
//!
//! Semantic and metadata search over content stored in IPFS.
//!
//! Files and pinned objects are run through a text/metadata extraction
//! pipeline, embedded by a remote inference service, and persisted as one
//! JSON record per content address. Queries blend metadata matches with
//! embedding similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────┐   ┌──────────────┐
//! │ContentStore  │──▶│ Extraction  │──▶│ Embedder  │──▶│ RecordStore  │
//! │ ipfs / local │   │ text + meta │   │  remote   │   │ <addr>.json  │
//! └──────────────┘   └─────────────┘   └───────────┘   └──────┬───────┘
//!                                                             ▼
//!                                                      ┌─────────────┐
//!                                                      │Hybrid query │
//!                                                      └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export IPFS_SEARCH_API_KEY=...
//! ipfs-search index ./reports/q3.pdf
//! ipfs-search build
//! ipfs-search search "Jane Doe"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Addresses, records, results, summaries |
//! | [`error`] | Error taxonomy with remediation hints |
//! | [`content_store`] | IPFS CLI and local blob backends |
//! | [`extract`] | Text and metadata extraction chains |
//! | [`inference`] | HTTP client for the inference service |
//! | [`embedding`] | Embedder trait, remote embedder, batching |
//! | [`store`] | Index record persistence |
//! | [`builder`] | Single-item and bulk indexing |
//! | [`search`] | Hybrid ranking |
//! | [`progress`] | Build progress on stderr |
//! | [`ingest`], [`get`], [`stats`] | CLI command implementations |

pub mod builder;
pub mod config;
pub mod content_store;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod get;
pub mod inference;
pub mod ingest;
pub mod models;
pub mod progress;
pub mod search;
pub mod stats;
pub mod store;
