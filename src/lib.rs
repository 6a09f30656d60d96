//! # Project Ingest
//!
//! Turns a directory of unstructured documents (DOCX, PDF) into a normalized
//! graph of projects and their shared lookup entities.
//!
//! Each document's text is sent to a locally hosted language model that is
//! asked for a fixed set of fields as JSON. The untrusted answer is
//! normalized into a typed record and reconciled into SQLite: one project per
//! `project_id`, linked to deduplicated sponsor, ingredient, therapeutic-area
//! and similar dictionary rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌────────┐
//! │ Document │──▶│  Model   │──▶│ Normalize │──▶│ Reconcile │──▶│ SQLite │
//! │  Reader  │   │ (Ollama) │   │  (pure)   │   │ (1 tx/doc)│   │        │
//! └──────────┘   └──────────┘   └───────────┘   └───────────┘   └────────┘
//!       ▲                                                            │
//!       └─────────────── Batch pipeline (per-file isolation) ────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | DOCX / PDF text extraction |
//! | [`llm`] | Model client and response validation |
//! | [`normalize`] | Raw model JSON → typed record |
//! | [`reconcile`] | Record → project graph |
//! | [`pipeline`] | Directory batch orchestration |
//! | [`show`] | Project retrieval |
//! | [`stats`] | Row counts |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod show;
pub mod stats;
