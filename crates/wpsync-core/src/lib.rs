//! # wpsync Core
//!
//! Runtime-agnostic logic for wpsync: post models, the content cleaner,
//! the store abstraction, and the reconciliation algorithm.
//!
//! This crate contains no tokio, sqlx, or network I/O. The runtime crate
//! (`wpsync`) supplies the HTTP fetcher, the SQLite store, and the
//! scheduler on top of it.

pub mod clean;
pub mod models;
pub mod reconcile;
pub mod store;
