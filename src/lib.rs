//! # Portal Search
//!
//! Backend core of an internal company search portal: a catalogue of
//! internal sites kept in a relational store, mirrored into a full-text
//! search index, and queried through search, as-you-type suggestions and
//! an OpenSearch browser integration. Every committed search is recorded
//! for usage analytics.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ write  ┌─────────────┐ resync ┌─────────────┐
//! │  Site CRUD  │──────▶│   SQLite    │──────▶│Search index │
//! └─────────────┘        └──────▲──────┘        └──────┬──────┘
//!                               │ events               │ search
//!                        ┌──────┴──────┐        ┌──────┴──────┐
//!                        │  Recorder   │◀──────│QueryExecutor│
//!                        └─────────────┘        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! portal init                   # create schema + admin user
//! portal index init             # seed the index with sample sites
//! portal search "payroll"
//! portal serve                  # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Sites, indexed documents, queries and responses |
//! | [`error`] | Request-level error taxonomy |
//! | [`index`] | Search index client (Meilisearch and in-memory backends) |
//! | [`sync`] | Mirrors the sites table into the index |
//! | [`search`] | Query execution |
//! | [`suggest`] | Suggestion fetching and the as-you-type selection model |
//! | [`analytics`] | Non-blocking event recording and reports |
//! | [`export`] | CSV / JSON analytics export |
//! | [`sites`] | Site CRUD with audit trail |
//! | [`auth`] | Users, bearer tokens and capabilities |
//! | [`opensearch`] | OpenSearch descriptor and redirect |
//! | [`server`] | HTTP API |
//! | [`stats`] | Terminal reports |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analytics;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod index;
pub mod migrate;
pub mod models;
pub mod opensearch;
pub mod search;
pub mod server;
pub mod sites;
pub mod stats;
pub mod suggest;
pub mod sync;
