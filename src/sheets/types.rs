use serde::{Deserialize, Serialize};
use std::fmt;

/// Target of a spreadsheet export: a sheet plus the column span used to measure occupied rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRange {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub start_column: String,
    pub end_column: String,
}

impl SheetRange {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        start_column: impl Into<String>,
        end_column: impl Into<String>,
    ) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            start_column: start_column.into(),
            end_column: end_column.into(),
        }
    }

    /// A1 range read to count occupied rows, e.g. `Sheet1!A:S`.
    pub fn read_range(&self) -> String {
        format!("{}!{}:{}", self.sheet_name, self.start_column, self.end_column)
    }

    /// Start cell for appended rows. The write always begins in column `A`, whatever
    /// `start_column` is.
    pub fn append_range(&self, occupied_rows: usize) -> String {
        format!("{}!A{}", self.sheet_name, occupied_rows + 1)
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spreadsheet {} ({})", self.spreadsheet_id, self.read_range())
    }
}

/// Body and response of `spreadsheets.values.get` / `spreadsheets.values.update`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    /// Absent from responses when the range holds no values.
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Summary returned by `spreadsheets.values.update`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateValuesResponse {
    pub spreadsheet_id: Option<String>,
    pub updated_range: Option<String>,
    pub updated_rows: Option<u64>,
    pub updated_columns: Option<u64>,
    pub updated_cells: Option<u64>,
}
