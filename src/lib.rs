//! # wpsync
//!
//! Mirrors posts from a WordPress site into a local SQLite store.
//!
//! Posts are pulled from the WordPress REST API page by page, their HTML is
//! cleaned into a canonical form, and each one is reconciled against the
//! local copy by remote id: new posts are inserted, strictly newer remote
//! revisions overwrite the stored fields, and everything else is skipped.
//! Local-only state (moderation flags) is never touched by a sync.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  WordPress  │──▶│   Fetcher   │──▶│  Reconcile   │──▶│  SQLite  │
//! │  REST API   │   │ retry/pages │   │ clean+decide │   │  posts   │
//! └─────────────┘   └─────────────┘   └──────────────┘   └──────────┘
//!                          ▲
//!              ┌───────────┴───────────┐
//!              │  Scheduler / Tracker  │◀── CLI (wpsync), HTTP API
//!              └───────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wpsync init                  # create database
//! wpsync sync                  # one full cycle
//! wpsync sync --post 412       # resync a single post
//! wpsync status                # last recorded cycle
//! wpsync serve                 # HTTP API + background schedule
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`fetcher`] | Content source trait and WordPress client |
//! | [`sync`] | Sync cycle orchestration |
//! | [`tracker`] | Single-flight status tracker |
//! | [`scheduler`] | Periodic cycles and manual resyncs |
//! | [`service`] | Application-facing entry points |
//! | [`server`] | HTTP control API |
//! | [`sqlite_store`] | SQLite post store and run log |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod migrate;
pub mod progress;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod sqlite_store;
pub mod sync;
pub mod tracker;

pub use wpsync_core::clean::{clean_content, clean_text};
pub use wpsync_core::models;
