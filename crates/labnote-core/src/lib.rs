//! # labnote-core
//!
//! Core types, traits, and the export-reconciliation pipeline for labnote.
//!
//! A lab note carries a markdown table of recordings (one row per stack).
//! This crate turns that table into typed [`Record`]s, validates them against
//! the relational store behind the [`LabStore`] port, walks the user through
//! creating any missing sites, and upserts the final experiment/stack rows.

pub mod config;
pub mod defaults;
pub mod document;
pub mod error;
pub mod export;
pub mod logging;
pub mod memory;
pub mod models;
pub mod table;
pub mod traits;
pub mod upsert;
pub mod validation;
pub mod wizard;

// Re-export commonly used types at crate root
pub use config::{ConfigError, DatabaseConfig, DatabaseEngine, DateTimeFormats, LabnoteConfig};
pub use error::{Error, Result};
pub use export::{
    check_document, export_document, insert_table_template, prepare_records, resolve_animal,
    upgrade_table, ExportOutcome, ExportRequest,
};
pub use memory::MemoryStore;
pub use models::*;
pub use traits::*;
pub use upsert::{upsert_batch, UpsertFailure};
pub use validation::{validate_batch, Verdict, Violations};
pub use wizard::{SiteInputError, Termination, Wizard, WizardStep};
