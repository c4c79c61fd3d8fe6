//! # In-Memory Tabular Datasets
//!
//! This module defines the tabular value that every sink consumes: an ordered sequence of named
//! columns, each holding scalar values of a single kind. Column order is significant because both
//! the PostgreSQL bulk-copy path and the spreadsheet writer are positional.
//!
//! ## Usage
//!
//! Build a [`Dataset`] programmatically with [`Dataset::new`] and [`Dataset::push_row`], or load
//! one from a CSV file with [`Dataset::from_csv_path`], which infers each column's kind.
//!
//! ## Submodules
//!
//! - **types**: Defines `Value`, `ValueKind`, `Column` and `Dataset`.
//! - **load**: Contains CSV loading and per-column kind inference.

mod load;
mod types;

pub use types::{Column, Dataset, Value, ValueKind, TIMESTAMP_FORMAT};
