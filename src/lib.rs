//! # docsync
//!
//! Keeps a vector index synchronized with a live folder of documents.
//!
//! Two halves do the work:
//!
//! - **Change detection** ([`detector`], [`watcher`]): a content-hash map of
//!   every file under the watched root, persisted across restarts, diffed at
//!   startup and updated from OS notifications at runtime.
//! - **Index reconciliation** ([`reconcile`]): turns each change into the
//!   minimal add/delete operations on a chunk-level index, using
//!   deterministic chunk ids so repeated scans are idempotent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────┐   ┌──────────────┐   ┌──────────┐
//! │  notify  │──▶│ChangeDetector│──▶│ queue  │──▶│IndexReconciler│──▶│  SQLite  │
//! │  events  │   │  HashStore   │   │ worker │   │ load+chunk+  │   │  index   │
//! └──────────┘   └──────────────┘   └────────┘   │    embed     │   └──────────┘
//!                                                └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | `SyncError` |
//! | [`hasher`] | SHA-256 file digests |
//! | [`hash_store`] | Persisted path → digest map |
//! | [`filter`] | Reserved, temporary and excluded paths |
//! | [`detector`] | Startup diff and runtime classification |
//! | [`watcher`] | OS notification loop |
//! | [`loader`] | Extension-dispatched document loading |
//! | [`embedding`] | Embedding providers and profile registry |
//! | [`reconcile`] | `full` / `modify` / `remove` / `reset` |
//! | [`worker`] | Bounded queue between detector and reconciler |
//! | [`sqlite_store`] | SQLite `IndexStore` backend |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod detector;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod hash_store;
pub mod hasher;
pub mod loader;
pub mod migrate;
pub mod reconcile;
pub mod sqlite_store;
pub mod status;
pub mod watch_cmd;
pub mod watcher;
pub mod worker;

pub use docsync_core::{chunk, ids, models, store};
