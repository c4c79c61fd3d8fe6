//! # Google Sheets Access
//!
//! This module wraps the Sheets API v4 `values` endpoints used by the spreadsheet inserter:
//! reading a range to find how many rows are already occupied, and writing a block of rows at a
//! given start cell. Requests are authenticated with a service-account key, exchanged for a bearer
//! token through a signed JWT assertion.
//!
//! ## Usage
//!
//! Build a [`GoogleSheetsHandler`] with [`GoogleSheetsHandler::from_service_account_file`], then
//! call [`GoogleSheetsHandler::execute_query`] and [`GoogleSheetsHandler::update_range`].
//!
//! ## Submodules
//!
//! - **auth**: Service-account key loading and access-token exchange.
//! - **client**: The REST client for the `values` endpoints.
//! - **types**: Defines `SheetRange` and the API payloads.

mod auth;
mod client;
mod types;

pub use auth::{ServiceAccountKey, TokenProvider, SPREADSHEETS_SCOPE};
pub use client::{GoogleSheetsHandler, DEFAULT_BASE_URL};
pub use types::{SheetRange, UpdateValuesResponse};
