//! Tools for exporting datasets to MySQL, PostgreSQL and Google Sheets.
//!
//! Each sink has an inserter that opens its connection on first use and owns it until the end of
//! its one and only [`insert`]. The insert appends every row of a [`Dataset`] to the destination,
//! closes the connection whatever happened, and then reports the outcome, a failed connection
//! included, according to a [`FailurePolicy`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tabular_sinks::connection::Credentials;
//! use tabular_sinks::dataset::Dataset;
//! use tabular_sinks::export::PostgresInserter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!   let mut dataset = Dataset::new(["id", "name"]);
//!   dataset.push_row(vec![1.into(), "alpha".into()])?;
//!
//!   let credentials = Credentials::new("postgres", "password", "localhost").with_database("test_db");
//!   let inserter = PostgresInserter::new(&credentials);
//!   inserter.insert(&dataset, "table_name").await?;
//!   Ok(())
//! }
//! ```
//!
//! ## Submodules
//!
//! - **mysql**: Row-by-row batch insert through a MySQL session.
//! - **postgres**: CSV bulk copy through a PostgreSQL session.
//! - **sheets**: Append below the occupied rows of a sheet.

mod mysql;
mod postgres;
mod sheets;

use crate::dataset::Dataset;
use anyhow::Result as AnyhowResult;
use async_trait::async_trait;
use log::{error, info, warn};
use std::fmt;

pub use mysql::{insert_statement, MySqlInserter};
pub use postgres::{copy_statement, encode_csv, PostgresInserter};
pub use sheets::{sheet_values, GoogleSheetsInserter};

/// What [`insert`] does with a failed write once it has been logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
  /// Log the failure and return `Ok(())`; callers only learn about it from the log.
  #[default]
  LogAndContinue,
  /// Log the failure and return it.
  Propagate,
}

/// A sink that can take a whole dataset in one call.
#[async_trait]
pub trait Inserter: Send {
  /// Where a dataset goes: a table name or a sheet range.
  type Destination: fmt::Display + Sync + ?Sized;

  /// Connection target for log messages, with secrets masked.
  fn target(&self) -> String;

  /// Appends every row of `dataset` to `destination` and returns the number of rows written.
  async fn write_dataset(
    &mut self,
    dataset: &Dataset,
    destination: &Self::Destination,
  ) -> AnyhowResult<u64>;

  /// Releases the underlying connection.
  async fn close(&mut self) -> AnyhowResult<()>;
}

/// Writes `dataset` to `destination`, then closes the inserter on both the success and the failure
/// path. Consuming the inserter guarantees its connection is never reused.
///
/// # Returns
///
/// * `Ok(())` - The write succeeded, or it failed under [`FailurePolicy::LogAndContinue`].
/// * `Err(anyhow::Error)` - The write failed under [`FailurePolicy::Propagate`].
pub async fn insert<I: Inserter>(
  mut inserter: I,
  dataset: &Dataset,
  destination: &I::Destination,
  policy: FailurePolicy,
) -> AnyhowResult<()> {
  let outcome = inserter.write_dataset(dataset, destination).await;

  if let Err(e) = inserter.close().await {
    warn!("Failed to close connection to {}: {:#}", inserter.target(), e);
  }

  match outcome {
    Ok(rows) => {
      info!("Data successfully inserted into {} ({} rows)", destination, rows);
      Ok(())
    }
    Err(e) => {
      error!("Failed to insert data into {}: {:#}", destination, e);
      match policy {
        FailurePolicy::LogAndContinue => Ok(()),
        FailurePolicy::Propagate => Err(e.context(format!("Failed to insert data into {}", destination))),
      }
    }
  }
}
