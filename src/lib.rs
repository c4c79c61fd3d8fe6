//! Tabular Sinks Library
//!
//! This library exports in-memory tabular datasets to MySQL tables, PostgreSQL tables
//! (through CSV bulk copy) and Google Sheets ranges.
//!

pub mod connection;
pub mod dataset;
pub mod export;
pub mod session;
pub mod sheets;
