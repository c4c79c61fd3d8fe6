use super::types::RowSet;
use super::SessionHandler;
use crate::connection::{build_url, Credentials, Dialect};
use crate::dataset::Value;
use anyhow::{Context, Result as AnyhowResult};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, warn};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Transaction, TxOpts};

/// A single `mysql_async` connection.
///
/// Transactions are opened with `START TRANSACTION` per operation and never outlive the call that
/// opened them.
pub struct MySqlSession {
  conn: Option<Conn>,
}

impl MySqlSession {
  /// Connects using discrete credentials (see [`build_url`]).
  pub async fn connect(credentials: &Credentials) -> AnyhowResult<Self> {
    Self::connect_url(&build_url(Dialect::MySql, credentials)).await
  }

  /// Connects using a ready-made `mysql://` URL.
  pub async fn connect_url(url: &str) -> AnyhowResult<Self> {
    let opts = Opts::from_url(url).context("Invalid MySQL connection URL")?;
    let conn = Conn::new(opts)
      .await
      .context("Failed to connect to MySQL")?;
    Ok(Self { conn: Some(conn) })
  }

  fn conn_mut(&mut self) -> AnyhowResult<&mut Conn> {
    self.conn.as_mut().context("MySQL session is closed")
  }
}

#[async_trait]
impl SessionHandler for MySqlSession {
  fn dialect(&self) -> Dialect {
    Dialect::MySql
  }

  async fn execute_query(&mut self, query: &str) -> AnyhowResult<Option<RowSet>> {
    let conn = self.conn_mut()?;
    let mut transaction = conn
      .start_transaction(TxOpts::default())
      .await
      .context("Failed to start transaction")?;
    let outcome = run_query(&mut transaction, query).await;
    finish(transaction, outcome).await
  }

  async fn batch_update(&mut self, statement: &str, param_rows: &[Vec<Value>]) -> AnyhowResult<()> {
    let conn = self.conn_mut()?;
    let mut transaction = conn
      .start_transaction(TxOpts::default())
      .await
      .context("Failed to start transaction")?;
    let outcome = apply_batch(&mut transaction, statement, param_rows).await;
    finish(transaction, outcome).await
  }

  async fn close_connection(&mut self) -> AnyhowResult<()> {
    let conn = self
      .conn
      .take()
      .context("MySQL session is already closed")?;
    conn.disconnect()
      .await
      .context("Failed to close MySQL connection")?;
    debug!("Closed MySQL connection");
    Ok(())
  }
}

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

async fn run_query(transaction: &mut Transaction<'_>, query: &str) -> AnyhowResult<Option<RowSet>> {
  let mut result = transaction
    .query_iter(query)
    .await
    .context("Failed to execute query")?;

  let column_types: Vec<ColumnType> = result
    .columns_ref()
    .iter()
    .map(|c| c.column_type())
    .collect();
  if column_types.is_empty() {
    debug!("Statement affected {} row(s)", result.affected_rows());
    result
      .drop_result()
      .await
      .context("Failed to drain statement result")?;
    return Ok(None);
  }

  let columns = result
    .columns_ref()
    .iter()
    .map(|c| c.name_str().into_owned())
    .collect();
  let raw_rows: Vec<mysql_async::Row> = result
    .collect()
    .await
    .context("Failed to read query rows")?;
  result
    .drop_result()
    .await
    .context("Failed to drain query result")?;

  let rows = raw_rows
    .into_iter()
    .map(|mut row| {
      column_types
        .iter()
        .enumerate()
        .map(|(i, column_type)| {
          let value = row.take(i).unwrap_or(mysql_async::Value::NULL);
          from_mysql(value, *column_type)
        })
        .collect()
    })
    .collect();

  Ok(Some(RowSet { columns, rows }))
}

async fn apply_batch(
  transaction: &mut Transaction<'_>,
  statement: &str,
  param_rows: &[Vec<Value>],
) -> AnyhowResult<()> {
  let prepared = transaction
    .prep(statement)
    .await
    .context("Failed to prepare batch statement")?;

  for (i, row) in param_rows.iter().enumerate() {
    let params = row
      .iter()
      .map(to_mysql)
      .collect::<AnyhowResult<Vec<_>>>()
      .with_context(|| format!("Failed to encode parameter row {}", i))?;
    transaction
      .exec_drop(&prepared, params)
      .await
      .with_context(|| format!("Failed to apply parameter row {}", i))?;
  }
  debug!("Applied {} parameter row(s)", param_rows.len());
  Ok(())
}

fn to_mysql(value: &Value) -> AnyhowResult<mysql_async::Value> {
  let value = match value {
    Value::Null => mysql_async::Value::NULL,
    Value::Int(n) => mysql_async::Value::Int(*n),
    Value::Float(x) => mysql_async::Value::Double(*x),
    Value::Text(s) => mysql_async::Value::from(s.as_str()),
    Value::Bool(b) => mysql_async::Value::from(*b),
    Value::Timestamp(ts) => {
      let year = u16::try_from(ts.year())
        .with_context(|| format!("Year {} of {} cannot be sent to MySQL", ts.year(), ts))?;
      // A leap second carries nanoseconds past 999_999_999
      let micros = (ts.nanosecond() / 1_000).min(999_999);
      mysql_async::Value::Date(
        year,
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
        micros,
      )
    }
  };
  Ok(value)
}

/// Text-protocol results arrive as bytes; the column type decides how they are read back.
fn from_mysql(value: mysql_async::Value, column_type: ColumnType) -> Value {
  match value {
    mysql_async::Value::NULL => Value::Null,
    mysql_async::Value::Bytes(bytes) => {
      parse_text(String::from_utf8_lossy(&bytes).into_owned(), column_type)
    }
    mysql_async::Value::Int(n) => Value::Int(n),
    mysql_async::Value::UInt(n) => i64::try_from(n)
      .map(Value::Int)
      .unwrap_or_else(|_| Value::Text(n.to_string())),
    mysql_async::Value::Float(x) => Value::Float(x.into()),
    mysql_async::Value::Double(x) => Value::Float(x),
    mysql_async::Value::Date(year, month, day, hour, minute, second, micros) => {
      NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())
        .and_then(|d| d.and_hms_micro_opt(hour.into(), minute.into(), second.into(), micros))
        .map(Value::Timestamp)
        .unwrap_or(Value::Null)
    }
    mysql_async::Value::Time(negative, days, hours, minutes, seconds, micros) => {
      let sign = if negative { "-" } else { "" };
      let hours = days * 24 + u32::from(hours);
      Value::Text(format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, minutes, seconds, micros))
    }
  }
}

fn parse_text(text: String, column_type: ColumnType) -> Value {
  use ColumnType::*;
  match column_type {
    MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
    | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => {
      text.parse().map(Value::Int).unwrap_or_else(|_| Value::Text(text))
    }
    MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => {
      text.parse().map(Value::Float).unwrap_or_else(|_| Value::Text(text))
    }
    MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_DATE => parse_datetime(&text)
      .map(Value::Timestamp)
      .unwrap_or_else(|| Value::Text(text)),
    _ => Value::Text(text),
  }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
  NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
    .ok()
    .or_else(|| {
      NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_timestamp_parameter_keeps_microseconds() {
    let ts = NaiveDate::from_ymd_opt(2022, 4, 9)
      .unwrap()
      .and_hms_micro_opt(0, 29, 37, 125)
      .unwrap();
    assert_eq!(
      to_mysql(&Value::Timestamp(ts)).unwrap(),
      mysql_async::Value::Date(2022, 4, 9, 0, 29, 37, 125)
    );
  }

  #[test]
  fn test_timestamp_parameter_rejects_years_beyond_u16() {
    let ts = NaiveDate::from_ymd_opt(70_000, 1, 1)
      .unwrap()
      .and_hms_opt(0, 0, 0)
      .unwrap();
    let err = to_mysql(&Value::Timestamp(ts)).unwrap_err();
    assert!(err.to_string().contains("Year 70000"));

    let ts = NaiveDate::from_ymd_opt(-1, 1, 1)
      .unwrap()
      .and_hms_opt(0, 0, 0)
      .unwrap();
    assert!(to_mysql(&Value::Timestamp(ts)).is_err());
  }

  #[test]
  fn test_leap_second_clamps_microseconds() {
    let ts = NaiveDate::from_ymd_opt(2016, 12, 31)
      .unwrap()
      .and_hms_nano_opt(23, 59, 59, 1_500_000_000)
      .unwrap();
    assert_eq!(
      to_mysql(&Value::Timestamp(ts)).unwrap(),
      mysql_async::Value::Date(2016, 12, 31, 23, 59, 59, 999_999)
    );
  }

  #[test]
  fn test_text_results_follow_column_type() {
    let bytes = |s: &str| mysql_async::Value::Bytes(s.as_bytes().to_vec());

    assert_eq!(from_mysql(bytes("42"), ColumnType::MYSQL_TYPE_LONG), Value::Int(42));
    assert_eq!(from_mysql(bytes("1.5"), ColumnType::MYSQL_TYPE_DOUBLE), Value::Float(1.5));
    assert_eq!(
      from_mysql(bytes("12.30"), ColumnType::MYSQL_TYPE_NEWDECIMAL),
      Value::Text("12.30".into())
    );
    assert_eq!(
      from_mysql(bytes("2022-04-09"), ColumnType::MYSQL_TYPE_DATE),
      Value::Timestamp(NaiveDate::from_ymd_opt(2022, 4, 9).unwrap().and_hms_opt(0, 0, 0).unwrap())
    );
    assert_eq!(from_mysql(mysql_async::Value::NULL, ColumnType::MYSQL_TYPE_LONG), Value::Null);
  }

  #[test]
  fn test_time_values_render_as_text() {
    let value = from_mysql(
      mysql_async::Value::Time(true, 1, 2, 3, 4, 5),
      ColumnType::MYSQL_TYPE_TIME,
    );
    assert_eq!(value, Value::Text("-26:03:04.000005".into()));
  }

  #[test]
  fn test_bool_parameter_is_integer() {
    assert_eq!(to_mysql(&Value::Bool(true)).unwrap(), mysql_async::Value::Int(1));
  }
}
