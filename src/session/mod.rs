//! # Transactional Sessions over Relational Connections
//!
//! This module owns the single connection behind each relational inserter and runs every
//! operation in its own transaction: committed when the operation succeeds, rolled back when it
//! fails. Errors are returned to the caller after the rollback; this layer never swallows them.
//!
//! ## Usage
//!
//! Open a [`PostgresSession`] or [`MySqlSession`] from [`Credentials`](crate::connection::Credentials),
//! then drive it through the [`SessionHandler`] trait. Once [`SessionHandler::close_connection`] has
//! run, every further call fails with a "session is closed" error.
//!
//! ## Submodules
//!
//! - **postgres**: `tokio-postgres` session, parameter encoding and COPY streaming.
//! - **mysql**: `mysql_async` session and value conversion.
//! - **params**: Rewrites `:name` placeholders for named parameter rows.
//! - **types**: Defines `RowSet`.

mod mysql;
mod params;
mod postgres;
mod types;

use crate::connection::Dialect;
use crate::dataset::Value;
use anyhow::{Context, Result as AnyhowResult};
use async_trait::async_trait;

pub use mysql::MySqlSession;
pub use params::{bind_named, NamedParams};
pub use postgres::PostgresSession;
pub use types::RowSet;

/// Capabilities shared by every relational session.
#[async_trait]
pub trait SessionHandler: Send {
  /// SQL dialect spoken over this connection.
  fn dialect(&self) -> Dialect;

  /// Runs `query` in a fresh transaction and commits it.
  ///
  /// # Returns
  ///
  /// * `Ok(Some(RowSet))` - The statement produced a row set (possibly with zero rows).
  /// * `Ok(None)` - The statement produced no row set at all (DDL, DML without `RETURNING`).
  /// * `Err(anyhow::Error)` - The statement failed; the transaction was rolled back.
  async fn execute_query(&mut self, query: &str) -> AnyhowResult<Option<RowSet>>;

  /// Executes `statement` once per entry of `param_rows`, in order, inside one transaction.
  ///
  /// Values bind positionally to the dialect's placeholders (`$1` for PostgreSQL, `?` for MySQL).
  /// Either every row is applied and committed, or the first failure rolls the whole batch back
  /// and is returned with the index of the failing row.
  async fn batch_update(&mut self, statement: &str, param_rows: &[Vec<Value>]) -> AnyhowResult<()>;

  /// Same as [`batch_update`](SessionHandler::batch_update) with `:name` placeholders and one
  /// mapping per row.
  ///
  /// Every row must carry a value for every name in the statement; a missing one fails the call
  /// before anything is executed.
  async fn batch_update_named(
    &mut self,
    statement: &str,
    param_rows: &[NamedParams],
  ) -> AnyhowResult<()> {
    let (positional, names) = bind_named(statement, self.dialect());
    let rows = param_rows
      .iter()
      .enumerate()
      .map(|(i, row)| {
        params::order_params(row, &names)
          .with_context(|| format!("Failed to bind parameter row {}", i))
      })
      .collect::<AnyhowResult<Vec<_>>>()?;
    self.batch_update(&positional, &rows).await
  }

  /// Releases the connection. Later calls on this session fail.
  async fn close_connection(&mut self) -> AnyhowResult<()>;
}
