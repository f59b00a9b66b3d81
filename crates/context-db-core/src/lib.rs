//! # Context DB Core
//!
//! Runtime-agnostic logic for Context DB: the resource model, URI namespace
//! and resolver, the store abstraction (with an in-memory backend), the
//! vector search index, and the embedding/summarization capability traits.
//!
//! This crate has no tokio, sqlx, network, or filesystem dependencies. The
//! `context-db` app crate supplies persistence, providers, and the
//! background pipelines.

pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod namespace;
pub mod shard;
pub mod store;
pub mod summary;
pub mod uri;

pub use error::ContextError;
pub use uri::ResourceUri;
