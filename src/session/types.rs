use crate::dataset::Value;

/// Rows returned by a row-producing statement, with the column names in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
  pub columns: Vec<String>,
  pub rows: Vec<Vec<Value>>,
}

impl RowSet {
  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }
}
