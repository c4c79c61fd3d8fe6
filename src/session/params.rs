use crate::connection::Dialect;
use crate::dataset::Value;
use anyhow::{Context, Result as AnyhowResult};
use std::collections::HashMap;

/// A parameter row keyed by placeholder name, without the leading colon.
pub type NamedParams = HashMap<String, Value>;

/// Rewrites `:name` placeholders into the dialect's positional form.
///
/// PostgreSQL gets `$1, $2, ...` with a repeated name reusing its first number; MySQL gets one `?`
/// per occurrence. Quoted literals and identifiers are copied untouched, as are `::` casts.
///
/// # Returns
///
/// The rewritten statement and the names in the order their values must be bound.
pub fn bind_named(statement: &str, dialect: Dialect) -> (String, Vec<String>) {
  let mut sql = String::with_capacity(statement.len());
  let mut names: Vec<String> = Vec::new();
  let mut chars = statement.chars().peekable();
  let mut quote: Option<char> = None;

  while let Some(c) = chars.next() {
    if let Some(q) = quote {
      sql.push(c);
      if c == q {
        quote = None;
      }
      continue;
    }
    match c {
      '\'' | '"' | '`' => {
        quote = Some(c);
        sql.push(c);
      }
      ':' if chars.peek() == Some(&':') => {
        sql.push_str("::");
        chars.next();
      }
      ':' if chars.peek().map_or(false, |n| n.is_ascii_alphabetic() || *n == '_') => {
        let mut name = String::new();
        while let Some(&n) = chars.peek() {
          if !(n.is_ascii_alphanumeric() || n == '_') {
            break;
          }
          name.push(n);
          chars.next();
        }
        match dialect {
          Dialect::Postgres => {
            let index = match names.iter().position(|existing| *existing == name) {
              Some(index) => index,
              None => {
                names.push(name);
                names.len() - 1
              }
            };
            sql.push_str(&format!("${}", index + 1));
          }
          Dialect::MySql => {
            names.push(name);
            sql.push('?');
          }
        }
      }
      _ => sql.push(c),
    }
  }

  (sql, names)
}

/// Orders one named row by `names`, failing on the first name the row does not carry.
pub(crate) fn order_params(row: &NamedParams, names: &[String]) -> AnyhowResult<Vec<Value>> {
  names
    .iter()
    .map(|name| {
      row
        .get(name)
        .cloned()
        .with_context(|| format!("Missing value for parameter :{}", name))
    })
    .collect()
}
