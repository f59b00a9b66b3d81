//! # Context DB
//!
//! A local context database for AI tools. Files and URLs are ingested under
//! stable `ctx://resources/...` URIs; two background pipelines derive a
//! dense embedding and two generated summary levels per resource; search
//! and hierarchical browsing run over the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌──────────────┐
//! │ add (file / │──▶│ Namespace  │──▶│ Resource     │
//! │  URL)       │   │ Resolver   │   │ Store (SQL)  │
//! └─────────────┘   └────────────┘   └──────┬───────┘
//!                                           │ enqueue
//!                        ┌──────────────────┴─────────────┐
//!                        ▼                                ▼
//!                 ┌────────────┐                   ┌─────────────┐
//!                 │ Embedding  │──▶ Search Index   │ Summarizing │──▶ L0 / L1
//!                 │ pipeline   │                   │ pipeline    │
//!                 └─────┬──────┘                   └──────┬──────┘
//!                       └──────── Completion Tracker ─────┘
//! ```
//!
//! ## Content levels
//!
//! | Level | Name | Produced by |
//! |-------|------|-------------|
//! | L0 | abstract | summarization pipeline |
//! | L1 | overview | summarization pipeline |
//! | L2 | content | stored verbatim on add |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `ResourceStore` |
//! | [`origin`] | Origin classification and content loading |
//! | [`http`] | Shared provider HTTP plumbing |
//! | [`embedding`] | Embedding providers |
//! | [`summarize`] | Summarization providers |
//! | [`locks`] | Per-key async locks |
//! | [`tracker`] | Completion tracker and join barrier |
//! | [`pipeline`] | Worker pools for both pipelines |
//! | [`engine`] | The `ContextDb` façade |
//! | [`ingest`] | `add` / `add-dir` commands |
//! | [`search`] | `search` command |
//! | [`get`] | `ls` / `read` / `abstract` / `overview` / `status` commands |
//! | [`stats`] | `info` command |

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod get;
pub mod http;
pub mod ingest;
pub mod locks;
pub mod migrate;
pub mod origin;
pub mod pipeline;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod summarize;
pub mod tracker;

pub use context_db_core as core;
pub use engine::{ContextDb, EngineOptions, Stats};
pub use tracker::{JoinScope, JoinSummary};
