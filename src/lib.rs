//! # Notes RAG
//!
//! Retrieve-and-rerank question answering over personal markdown notes.
//!
//! Notes are split into header-aware chunks, embedded, and stored in a
//! SQLite collection. A question is answered in two stages: a cheap
//! vector search gathers a candidate pool, a cross-encoder reranks it,
//! and the best few chunks become the context of an LLM prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Dataset   │──▶│ Chunk+Embed  │──▶│  SQLite  │
//! │ file / dir │   │              │   │  vectors │
//! └────────────┘   └──────────────┘   └────┬─────┘
//!                                          │ stage 1: top-k
//!                                          ▼
//!                  ┌──────────┐      ┌──────────┐
//!                  │ Generate │◀─────│ Rerank   │
//!                  │ (stream) │ top-n│ stage 2  │
//!                  └──────────┘      └──────────┘
//! ```
//!
//! The algorithms and capability traits live in `notes-rag-core`; this
//! crate holds configuration, persistence, provider adapters, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest                      # chunk, embed and store the dataset
//! rag search "release checklist"  # retrieval only
//! rag ask "what did I decide about the API?"
//! rag chat                        # interactive loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`sources`] | Dataset loading |
//! | [`ingest`] | Segmentation, embedding, storage |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`embedding`] | Embedding providers |
//! | [`rerank`] | Reranker providers |
//! | [`generate`] | Answer generation providers |
//! | [`prompt`] | Prompt template |
//! | [`ask`] | Ask, search, and chat commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generate;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod prompt;
pub mod rerank;
pub mod sources;
pub mod sqlite_index;
pub mod stats;
