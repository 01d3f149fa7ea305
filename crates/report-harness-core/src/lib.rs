//! # Report Harness Core
//!
//! Shared, side-effect-free logic for Report Harness: data models, inline
//! text normalization, malformed table reconstruction, and the structural
//! validation gate.
//!
//! This crate contains no tokio, network, or filesystem I/O. Every
//! function is synchronous and deterministic, so sections can be repaired
//! in parallel without coordination.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Retrieval and document data types |
//! | [`dictionary`] | Data-driven split-word repair table |
//! | [`normalize`] | Emphasis stripping, split-word repair, whitespace canon |
//! | [`table`] | Canonical pipe-table grid: parse, render, scan |
//! | [`classify`] | Compact (delimiter-less) table detection |
//! | [`schema`] | Ordered schema matchers for compact tables |
//! | [`reconstruct`] | Block scanner that rebuilds or quarantines tables |
//! | [`validate`] | Minimum-table-count inspection gate |

pub mod classify;
pub mod dictionary;
pub mod models;
pub mod normalize;
pub mod reconstruct;
pub mod schema;
pub mod table;
pub mod validate;
