use super::types::RowSet;
use super::SessionHandler;
use crate::connection::{build_url, Credentials, Dialect};
use crate::dataset::Value;
use anyhow::{bail, Context, Result as AnyhowResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::{pin_mut, SinkExt};
use log::{debug, error, warn};
use std::error::Error;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row, Transaction};

/// A single `tokio-postgres` connection plus the task driving it.
///
/// All operations take `&mut self`, so at most one transaction is ever open on the connection.
pub struct PostgresSession {
  client: Option<Client>,
  driver: Option<JoinHandle<()>>,
}

impl PostgresSession {
  /// Connects using discrete credentials (see [`build_url`]).
  pub async fn connect(credentials: &Credentials) -> AnyhowResult<Self> {
    Self::connect_url(&build_url(Dialect::Postgres, credentials)).await
  }

  /// Connects using a ready-made `postgresql://` URL or key/value connection string.
  pub async fn connect_url(url: &str) -> AnyhowResult<Self> {
    let (client, connection) = tokio_postgres::connect(url, NoTls)
      .await
      .context("Failed to connect to PostgreSQL")?;
    let driver = tokio::spawn(async move {
      if let Err(e) = connection.await {
        error!("Database connection error: {}", e);
      }
    });

    Ok(Self {
      client: Some(client),
      driver: Some(driver),
    })
  }

  fn client_mut(&mut self) -> AnyhowResult<&mut Client> {
    self.client.as_mut().context("PostgreSQL session is closed")
  }

  /// Runs a `COPY ... FROM STDIN` statement inside its own transaction, streaming `data` as input.
  ///
  /// An empty `data` still executes the statement, which then copies nothing.
  ///
  /// # Returns
  ///
  /// * `Ok(u64)` - Number of rows the server reports as copied.
  /// * `Err(anyhow::Error)` - The copy failed; the transaction was rolled back.
  pub async fn copy_in(&mut self, statement: &str, data: Bytes) -> AnyhowResult<u64> {
    let client = self.client_mut()?;
    let transaction = client
      .transaction()
      .await
      .context("Failed to start transaction")?;
    let outcome = stream_copy(&transaction, statement, data).await;
    finish(transaction, outcome).await
  }
}

#[async_trait]
impl SessionHandler for PostgresSession {
  fn dialect(&self) -> Dialect {
    Dialect::Postgres
  }

  async fn execute_query(&mut self, query: &str) -> AnyhowResult<Option<RowSet>> {
    let client = self.client_mut()?;
    let transaction = client
      .transaction()
      .await
      .context("Failed to start transaction")?;
    let outcome = run_query(&transaction, query).await;
    finish(transaction, outcome).await
  }

  async fn batch_update(&mut self, statement: &str, param_rows: &[Vec<Value>]) -> AnyhowResult<()> {
    let client = self.client_mut()?;
    let transaction = client
      .transaction()
      .await
      .context("Failed to start transaction")?;
    let outcome = apply_batch(&transaction, statement, param_rows).await;
    finish(transaction, outcome).await
  }

  async fn close_connection(&mut self) -> AnyhowResult<()> {
    let client = self
      .client
      .take()
      .context("PostgreSQL session is already closed")?;
    // The connection task ends once its last client is gone.
    drop(client);
    if let Some(driver) = self.driver.take() {
      driver.await.context("PostgreSQL connection task panicked")?;
    }
    debug!("Closed PostgreSQL connection");
    Ok(())
  }
}

/// Commits on success, rolls back on failure. Either way the transaction is consumed.
async fn finish<T>(transaction: Transaction<'_>, outcome: AnyhowResult<T>) -> AnyhowResult<T> {
  match outcome {
    Ok(value) => {
      transaction
        .commit()
        .await
        .context("Failed to commit transaction")?;
      Ok(value)
    }
    Err(e) => {
      if let Err(rollback_err) = transaction.rollback().await {
        warn!("Rollback failed after error ({}): {}", e, rollback_err);
      }
      Err(e)
    }
  }
}

async fn run_query(transaction: &Transaction<'_>, query: &str) -> AnyhowResult<Option<RowSet>> {
  let statement = transaction
    .prepare(query)
    .await
    .context("Failed to prepare query")?;

  if statement.columns().is_empty() {
    let affected = transaction
      .execute(&statement, &[])
      .await
      .context("Failed to execute statement")?;
    debug!("Statement affected {} row(s)", affected);
    return Ok(None);
  }

  let columns = statement
    .columns()
    .iter()
    .map(|c| c.name().to_string())
    .collect();
  let rows = transaction
    .query(&statement, &[])
    .await
    .context("Failed to execute query")?
    .iter()
    .map(row_values)
    .collect::<AnyhowResult<Vec<_>>>()?;

  Ok(Some(RowSet { columns, rows }))
}

async fn apply_batch(
  transaction: &Transaction<'_>,
  statement: &str,
  param_rows: &[Vec<Value>],
) -> AnyhowResult<()> {
  let prepared = transaction
    .prepare(statement)
    .await
    .context("Failed to prepare batch statement")?;

  for (i, row) in param_rows.iter().enumerate() {
    let params: Vec<PgParam> = row.iter().map(PgParam).collect();
    let param_refs: Vec<&(dyn ToSql + Sync)> = params
      .iter()
      .map(|p| p as &(dyn ToSql + Sync))
      .collect();
    transaction
      .execute(&prepared, &param_refs)
      .await
      .with_context(|| format!("Failed to apply parameter row {}", i))?;
  }
  debug!("Applied {} parameter row(s)", param_rows.len());
  Ok(())
}

async fn stream_copy(transaction: &Transaction<'_>, statement: &str, data: Bytes) -> AnyhowResult<u64> {
  let sink = transaction
    .copy_in::<_, Bytes>(statement)
    .await
    .context("Failed to start COPY")?;
  pin_mut!(sink);
  if !data.is_empty() {
    sink.send(data).await.context("Failed to stream COPY data")?;
  }
  let copied = sink.finish().await.context("Failed to finish COPY")?;
  Ok(copied)
}

fn row_values(row: &Row) -> AnyhowResult<Vec<Value>> {
  (0..row.len()).map(|idx| column_value(row, idx)).collect()
}

fn column_value(row: &Row, idx: usize) -> AnyhowResult<Value> {
  let column = &row.columns()[idx];
  let value = match *column.type_() {
    Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
    Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|n| Value::Int(n.into())),
    Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|n| Value::Int(n.into())),
    Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
    Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|x| Value::Float(x.into())),
    Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
    Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
      row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
    }
    Type::TIMESTAMP => row
      .try_get::<_, Option<NaiveDateTime>>(idx)?
      .map(Value::Timestamp),
    Type::TIMESTAMPTZ => row
      .try_get::<_, Option<DateTime<Utc>>>(idx)?
      .map(|ts| Value::Timestamp(ts.naive_utc())),
    ref other => bail!("Unsupported type {} for column {:?}", other, column.name()),
  };
  Ok(value.unwrap_or(Value::Null))
}

/// Binds a [`Value`] to whatever parameter type the server inferred for its placeholder.
///
/// Integers narrow to `INT2`/`INT4` when they fit, and timestamps become `TIMESTAMPTZ` in UTC
/// when the column asks for one; any other mismatch surfaces as the driver's type error.
#[derive(Debug)]
struct PgParam<'a>(&'a Value);

impl ToSql for PgParam<'_> {
  fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    match self.0 {
      Value::Null => Ok(IsNull::Yes),
      Value::Bool(b) => b.to_sql_checked(ty, out),
      Value::Int(n) => match *ty {
        Type::INT2 => i16::try_from(*n)?.to_sql_checked(ty, out),
        Type::INT4 => i32::try_from(*n)?.to_sql_checked(ty, out),
        Type::FLOAT4 => (*n as f32).to_sql_checked(ty, out),
        Type::FLOAT8 => (*n as f64).to_sql_checked(ty, out),
        _ => n.to_sql_checked(ty, out),
      },
      Value::Float(x) => match *ty {
        Type::FLOAT4 => (*x as f32).to_sql_checked(ty, out),
        _ => x.to_sql_checked(ty, out),
      },
      Value::Text(s) => s.as_str().to_sql_checked(ty, out),
      Value::Timestamp(ts) => match *ty {
        Type::TIMESTAMPTZ => ts.and_utc().to_sql_checked(ty, out),
        _ => ts.to_sql_checked(ty, out),
      },
    }
  }

  fn accepts(_ty: &Type) -> bool {
    true
  }

  to_sql_checked!();
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;

  fn encode(value: &Value, ty: &Type) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    let mut out = BytesMut::new();
    PgParam(value).to_sql_checked(ty, &mut out)
  }

  #[test]
  fn test_int_narrows_to_column_width() {
    let mut out = BytesMut::new();
    PgParam(&Value::Int(7)).to_sql_checked(&Type::INT4, &mut out).unwrap();
    assert_eq!(&out[..], &7i32.to_be_bytes());

    let mut out = BytesMut::new();
    PgParam(&Value::Int(7)).to_sql_checked(&Type::INT8, &mut out).unwrap();
    assert_eq!(&out[..], &7i64.to_be_bytes());
  }

  #[test]
  fn test_int_overflow_is_an_error() {
    assert!(encode(&Value::Int(i64::from(i16::MAX) + 1), &Type::INT2).is_err());
  }

  #[test]
  fn test_null_binds_to_any_type() {
    assert!(matches!(encode(&Value::Null, &Type::INT4), Ok(IsNull::Yes)));
    assert!(matches!(encode(&Value::Null, &Type::TEXT), Ok(IsNull::Yes)));
  }

  #[test]
  fn test_kind_mismatch_is_rejected() {
    assert!(encode(&Value::Text("abc".into()), &Type::INT4).is_err());
    assert!(encode(&Value::Bool(true), &Type::TEXT).is_err());
  }

  #[test]
  fn test_timestamp_binds_to_both_timestamp_types() {
    let ts = NaiveDate::from_ymd_opt(2023, 5, 6)
      .unwrap()
      .and_hms_opt(7, 8, 9)
      .unwrap();
    assert!(encode(&Value::Timestamp(ts), &Type::TIMESTAMP).is_ok());
    assert!(encode(&Value::Timestamp(ts), &Type::TIMESTAMPTZ).is_ok());
  }
}
