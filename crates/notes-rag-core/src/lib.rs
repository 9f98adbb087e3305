//! # notes-rag core
//!
//! Shared, WASM-safe logic for notes-rag: header-aware chunking, metadata
//! extraction, the capability traits for external services (embedding,
//! vector index, reranking, generation), and the two-stage
//! retrieve-and-rerank pipeline.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Concrete providers and the SQLite-backed
//! vector index live in the `notes-rag` application package.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod metadata;
pub mod models;
pub mod rerank;
pub mod retrieve;
pub mod store;

pub use error::RetrievalError;
