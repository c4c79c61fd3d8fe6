use super::{insert, FailurePolicy, Inserter};
use crate::dataset::{Dataset, Value, TIMESTAMP_FORMAT};
use crate::sheets::{GoogleSheetsHandler, SheetRange};
use anyhow::{Context, Result as AnyhowResult};
use async_trait::async_trait;
use log::debug;
use std::path::Path;

/// Appends datasets below the rows already present in a Google Sheet.
pub struct GoogleSheetsInserter {
    handler: GoogleSheetsHandler,
    policy: FailurePolicy,
}

impl GoogleSheetsInserter {
    /// Loads the service-account key; no request is made until [`insert`](GoogleSheetsInserter::insert).
    pub fn from_service_account_file(service_account_file: impl AsRef<Path>) -> AnyhowResult<Self> {
        Ok(Self::new(GoogleSheetsHandler::from_service_account_file(
            service_account_file,
        )?))
    }

    pub fn new(handler: GoogleSheetsHandler) -> Self {
        Self {
            handler,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Appends `dataset` to the sheet named by `range`.
    ///
    /// The occupied row count is measured over `range.start_column:range.end_column`, and the new
    /// rows are written from column `A` of the first free row. Values are stored as entered, never
    /// evaluated as formulas.
    pub async fn insert(self, dataset: &Dataset, range: &SheetRange) -> AnyhowResult<()> {
        let policy = self.policy;
        insert(self, dataset, range, policy).await
    }
}

#[async_trait]
impl Inserter for GoogleSheetsInserter {
    type Destination = SheetRange;

    fn target(&self) -> String {
        self.handler.target()
    }

    async fn write_dataset(&mut self, dataset: &Dataset, range: &SheetRange) -> AnyhowResult<u64> {
        let occupied = self
            .handler
            .execute_query(&range.spreadsheet_id, &range.read_range())
            .await
            .context("Failed to read existing rows")?
            .len();
        let start = range.append_range(occupied);
        debug!("{} occupied row(s) in {}, writing at {}", occupied, range.read_range(), start);

        let summary = self
            .handler
            .update_range(&range.spreadsheet_id, &start, sheet_values(dataset))
            .await
            .context("Failed to write rows")?;
        Ok(summary.updated_rows.unwrap_or(dataset.len() as u64))
    }

    async fn close(&mut self) -> AnyhowResult<()> {
        // HTTP connections are pooled by reqwest and released on drop.
        Ok(())
    }
}

/// Converts the dataset to the row-major JSON matrix the Sheets API expects.
pub fn sheet_values(dataset: &Dataset) -> Vec<Vec<serde_json::Value>> {
    dataset
        .rows()
        .map(|row| row.into_iter().map(cell_value).collect())
        .collect()
}

fn cell_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Int(n) => serde_json::Value::from(*n),
        // NaN and infinities have no JSON form
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Timestamp(ts) => serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sheet_values_are_row_major() {
        let mut dataset = Dataset::new(["name", "qty", "price", "ok"]);
        dataset
            .push_row(vec!["bolt".into(), 4.into(), 0.1.into(), true.into()])
            .unwrap();
        dataset
            .push_row(vec!["nut".into(), Value::Null, f64::NAN.into(), false.into()])
            .unwrap();

        assert_eq!(
            sheet_values(&dataset),
            vec![
                vec![json!("bolt"), json!(4), json!(0.1), json!(true)],
                vec![json!("nut"), json!(null), json!(null), json!(false)],
            ]
        );
    }

    #[test]
    fn test_empty_dataset_has_no_rows() {
        assert!(sheet_values(&Dataset::new(["a"])).is_empty());
    }
}
