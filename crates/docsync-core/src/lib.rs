//! # docsync core
//!
//! Pure logic shared by the docsync application: data models, the
//! overlapping-window chunker, deterministic chunk identifiers, the
//! [`store::IndexStore`] abstraction, and the embedding trait.
//!
//! This crate performs no filesystem or network I/O and pulls in no async
//! runtime, so every function here can be tested in isolation.

pub mod chunk;
pub mod embedding;
pub mod ids;
pub mod models;
pub mod store;
