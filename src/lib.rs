//! # Report Harness
//!
//! Collects research for a subject through a search service, drafts a
//! multi-section report with an LLM, and repairs the draft's markdown
//! before handing it on.
//!
//! Report Harness fans retrieval queries out concurrently with bounded
//! retries, aggregates what came back, and runs the generated draft through
//! a deterministic pipeline: compact tables are rebuilt into pipe grids (or
//! quarantined), inline text is normalized, and every section is checked
//! against a minimum table count.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐   ┌──────────────┐
//! │ Planner  │──▶│ Coordinator │──▶│ Aggregate │──▶│ DraftGenerator│
//! │  (JSON)  │   │ N × search  │   │   text    │   │    (JSON)    │
//! └──────────┘   └─────────────┘   └───────────┘   └──────┬───────┘
//!                                                         ▼
//!                ┌──────────────────────────────────────────────┐
//!                │ Pipeline: reconstruct → normalize → validate │
//!                └──────────────────────┬───────────────────────┘
//!                                       ▼
//!                                   Artifact
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rh collect plan.json --aggregate       # run the queries, print research
//! rh repair draft.json                   # rebuild tables, print artifact
//! rh validate section.md --min-tables 3  # count tables in a section
//! rh normalize < notes.md                # fix emphasis and split words
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`service`] | Search service boundary and HTTP client |
//! | [`retry`] | Backoff policy |
//! | [`coordinator`] | Bounded-concurrency retrieval |
//! | [`progress`] | Collection progress on stderr |
//! | [`plan`] | Planner JSON → retrieval requests |
//! | [`aggregate`] | Batch → analysis input text |
//! | [`draft`] | Draft generator boundary and response parsing |
//! | [`pipeline`] | Reconstruction pipeline and artifacts |
//! | [`report`] | End-to-end report run |
//! | [`commands`] | CLI command implementations |
//!
//! Text processing lives in the `report-harness-core` crate and is
//! re-exported here: [`models`], [`table`], [`classify`], [`schema`],
//! [`reconstruct`], [`normalize`], [`dictionary`], [`validate`].

pub use report_harness_core::{
    classify, dictionary, models, normalize, reconstruct, schema, table, validate,
};

pub mod aggregate;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod draft;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod report;
pub mod retry;
pub mod service;
