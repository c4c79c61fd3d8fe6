use super::types::{Dataset, Value, ValueKind};
use anyhow::{Context, Result as AnyhowResult};
use chrono::NaiveDateTime;
use log::debug;
use std::io::Read;
use std::path::Path;

/// Layouts tried, in order, when inferring a timestamp column.
const TIMESTAMP_LAYOUTS: [&str; 5] = [
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
];

impl Dataset {
  /// Loads a dataset from a CSV file whose first line is the header.
  ///
  /// # Arguments
  ///
  /// * `path` - Path of the CSV file.
  ///
  /// # Returns
  ///
  /// * `Ok(Dataset)` - One column per header field, kinds inferred from the cells.
  /// * `Err(anyhow::Error)` - The file could not be opened or is not valid CSV.
  pub fn from_csv_path(path: impl AsRef<Path>) -> AnyhowResult<Self> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
      .with_context(|| format!("Failed to open {}", path.display()))?;
    Self::from_csv_reader(file).with_context(|| format!("Failed to load {}", path.display()))
  }

  /// Loads a dataset from any CSV source whose first record is the header.
  ///
  /// Each column's kind is inferred from all of its non-empty cells, preferring integer, then
  /// float, then boolean, then timestamp, and falling back to text. Empty cells become `Null`.
  pub fn from_csv_reader<R: Read>(reader: R) -> AnyhowResult<Self> {
    let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = csv_reader
      .headers()
      .context("Failed to read CSV header")?
      .iter()
      .map(str::to_string)
      .collect();

    let mut raw_rows = Vec::new();
    for (i, record) in csv_reader.records().enumerate() {
      let record = record.with_context(|| format!("Failed to read CSV record {}", i + 1))?;
      raw_rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let kinds: Vec<ValueKind> = (0..headers.len())
      .map(|col| infer_kind(raw_rows.iter().map(|row| row[col].as_str())))
      .collect();
    debug!("Inferred column kinds {:?} for {:?}", kinds, headers);

    let mut dataset = Dataset::new(headers);
    for (i, row) in raw_rows.into_iter().enumerate() {
      let values = row
        .iter()
        .zip(&kinds)
        .map(|(cell, kind)| parse_cell(cell, *kind))
        .collect();
      dataset
        .push_row(values)
        .with_context(|| format!("Invalid CSV record {}", i + 1))?;
    }
    Ok(dataset)
  }
}

/// Picks the narrowest kind that every non-empty cell parses as.
fn infer_kind<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> ValueKind {
  let mut present = cells.filter(|c| !c.is_empty()).peekable();
  if present.peek().is_none() {
    return ValueKind::Text;
  }
  let all = |pred: fn(&str) -> bool| present.clone().all(pred);

  if all(|c| c.parse::<i64>().is_ok()) {
    ValueKind::Int
  } else if all(|c| c.parse::<f64>().is_ok()) {
    ValueKind::Float
  } else if all(|c| parse_bool(c).is_some()) {
    ValueKind::Bool
  } else if all(|c| parse_timestamp(c).is_some()) {
    ValueKind::Timestamp
  } else {
    ValueKind::Text
  }
}

fn parse_cell(cell: &str, kind: ValueKind) -> Value {
  if cell.is_empty() {
    return Value::Null;
  }
  // Inference already guaranteed every non-empty cell parses as `kind`.
  match kind {
    ValueKind::Int => cell.parse().map(Value::Int).unwrap_or(Value::Null),
    ValueKind::Float => cell.parse().map(Value::Float).unwrap_or(Value::Null),
    ValueKind::Bool => parse_bool(cell).map(Value::Bool).unwrap_or(Value::Null),
    ValueKind::Timestamp => parse_timestamp(cell).map(Value::Timestamp).unwrap_or(Value::Null),
    ValueKind::Text => Value::Text(cell.to_string()),
  }
}

fn parse_bool(cell: &str) -> Option<bool> {
  match cell.to_ascii_lowercase().as_str() {
    "true" => Some(true),
    "false" => Some(false),
    _ => None,
  }
}

fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
  TIMESTAMP_LAYOUTS
    .iter()
    .find_map(|layout| NaiveDateTime::parse_from_str(cell, layout).ok())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_from_csv_reader_infers_kinds() {
    let input = "id,price,active,seen,label\n\
                 1,2.5,true,2024-01-02 03:04:05,a\n\
                 2,3,FALSE,,\"b, c\"\n";
    let dataset = Dataset::from_csv_reader(input.as_bytes()).unwrap();

    let kinds: Vec<_> = dataset.columns().iter().map(|c| c.kind).collect();
    assert_eq!(
      kinds,
      vec![
        Some(ValueKind::Int),
        Some(ValueKind::Float),
        Some(ValueKind::Bool),
        Some(ValueKind::Timestamp),
        Some(ValueKind::Text),
      ]
    );

    let rows: Vec<_> = dataset.rows().collect();
    assert_eq!(rows[1][1], &Value::Float(3.0));
    assert_eq!(rows[1][2], &Value::Bool(false));
    assert_eq!(rows[1][3], &Value::Null);
    assert_eq!(rows[1][4], &Value::Text("b, c".into()));
  }

  #[test]
  fn test_all_empty_column_is_null() {
    let dataset = Dataset::from_csv_reader("a,b\n1,\n2,\n".as_bytes()).unwrap();
    assert_eq!(dataset.columns()[1].kind, None);
    assert!(dataset.columns()[1].values.iter().all(Value::is_null));
  }

  #[test]
  fn test_header_only_file_is_empty_dataset() {
    let dataset = Dataset::from_csv_reader("x,y\n".as_bytes()).unwrap();
    assert_eq!(dataset.column_names(), vec!["x", "y"]);
    assert!(dataset.is_empty());
  }

  #[test]
  fn test_ragged_csv_is_rejected() {
    assert!(Dataset::from_csv_reader("a,b\n1,2\n3\n".as_bytes()).is_err());
  }

  #[test]
  fn test_from_csv_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name,count").unwrap();
    writeln!(file, "widgets,7").unwrap();

    let dataset = Dataset::from_csv_path(file.path()).unwrap();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.columns()[1].values[0], Value::Int(7));
  }
}
