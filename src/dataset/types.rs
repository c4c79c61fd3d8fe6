use anyhow::{bail, Result as AnyhowResult};
use chrono::NaiveDateTime;
use std::fmt;

/// Text layout used whenever a timestamp is rendered for a text-based sink (CSV, Sheets).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Int(i64),
  Float(f64),
  Text(String),
  Bool(bool),
  Timestamp(NaiveDateTime),
}

/// The kind of a non-null [`Value`]; a column holds values of exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
  Int,
  Float,
  Text,
  Bool,
  Timestamp,
}

impl Value {
  /// Returns the kind of this value, or `None` for `Null`.
  pub fn kind(&self) -> Option<ValueKind> {
    match self {
      Value::Null => None,
      Value::Int(_) => Some(ValueKind::Int),
      Value::Float(_) => Some(ValueKind::Float),
      Value::Text(_) => Some(ValueKind::Text),
      Value::Bool(_) => Some(ValueKind::Bool),
      Value::Timestamp(_) => Some(ValueKind::Timestamp),
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }
}

impl fmt::Display for Value {
  /// Renders the value as plain text. `Null` renders as the empty string.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => Ok(()),
      Value::Int(n) => write!(f, "{}", n),
      Value::Float(x) => write!(f, "{}", x),
      Value::Text(s) => f.write_str(s),
      Value::Bool(b) => write!(f, "{}", b),
      Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
    }
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self {
    Value::Int(n)
  }
}

impl From<i32> for Value {
  fn from(n: i32) -> Self {
    Value::Int(n as i64)
  }
}

impl From<f64> for Value {
  fn from(x: f64) -> Self {
    Value::Float(x)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Text(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::Text(s)
  }
}

impl From<NaiveDateTime> for Value {
  fn from(ts: NaiveDateTime) -> Self {
    Value::Timestamp(ts)
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(value: Option<T>) -> Self {
    value.map(Into::into).unwrap_or(Value::Null)
  }
}

/// A named column. Its kind is fixed by the first non-null value pushed into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
  pub name: String,
  pub kind: Option<ValueKind>,
  pub values: Vec<Value>,
}

/// An ordered sequence of equally long, named columns.
///
/// Rows are stored column-major; [`Dataset::rows`] re-assembles them in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
  columns: Vec<Column>,
}

impl Dataset {
  /// Creates an empty dataset with the given column names, in order.
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let columns = names
      .into_iter()
      .map(|name| Column {
        name: name.into(),
        kind: None,
        values: Vec::new(),
      })
      .collect();
    Self { columns }
  }

  /// Appends one row.
  ///
  /// The row must have exactly one value per column, and each non-null value must match the kind
  /// already established for its column. A rejected row leaves the dataset unchanged.
  pub fn push_row(&mut self, row: Vec<Value>) -> AnyhowResult<()> {
    if row.len() != self.columns.len() {
      bail!(
        "Row has {} values but the dataset has {} columns",
        row.len(),
        self.columns.len()
      );
    }

    for (column, value) in self.columns.iter().zip(&row) {
      if let (Some(expected), Some(actual)) = (column.kind, value.kind()) {
        if expected != actual {
          bail!(
            "Column {:?} holds {:?} values, got {:?}",
            column.name,
            expected,
            actual
          );
        }
      }
    }

    for (column, value) in self.columns.iter_mut().zip(row) {
      if column.kind.is_none() {
        column.kind = value.kind();
      }
      column.values.push(value);
    }
    Ok(())
  }

  pub fn columns(&self) -> &[Column] {
    &self.columns
  }

  /// Column names in dataset order.
  pub fn column_names(&self) -> Vec<&str> {
    self.columns.iter().map(|c| c.name.as_str()).collect()
  }

  /// Number of rows.
  pub fn len(&self) -> usize {
    self.columns.first().map_or(0, |c| c.values.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Iterates over rows, each yielding its values in column order.
  pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
    (0..self.len()).map(move |i| self.columns.iter().map(|c| &c.values[i]).collect())
  }
}
