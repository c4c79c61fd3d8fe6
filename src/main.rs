//! Tabular Sinks: Export a CSV File to MySQL, PostgreSQL or Google Sheets
//!
//! This application loads a CSV file into a dataset and appends it to one sink.
//!
//! ## Design Overview
//! - **Loading**: The CSV header names the columns; column kinds are inferred from the cells.
//! - **Exporting**: The `export` module appends the rows and closes the connection.
//!
//! ## Usage
//! 1. Configure the destination with command-line flags or the matching environment variables:
//!    ```sh
//!    export DB_USER=postgres DB_PASSWORD=secret DB_HOST=localhost DB_NAME=test_db
//!    cargo run -- --input data.csv postgres --table measurements
//!    ```
//! 2. For Google Sheets, point `GOOGLE_APPLICATION_CREDENTIALS` at a service-account key:
//!    ```sh
//!    cargo run -- --input data.csv sheets --spreadsheet-id <id> --sheet Sheet1 --start-column A --end-column S
//!    ```
//! 3. Logs go to the console, controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
//!
//! ## Notes
//! - Failed exports, including unreachable servers, are logged and the process still exits
//!   successfully, unless `--strict` is set.

use anyhow::Result as AnyhowResult;
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use tabular_sinks::connection::Credentials;
use tabular_sinks::dataset::Dataset;
use tabular_sinks::export::{FailurePolicy, GoogleSheetsInserter, MySqlInserter, PostgresInserter};
use tabular_sinks::sheets::SheetRange;

/// Command-line arguments for exporting a CSV file to a sink.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
  /// CSV file to export; its first line must be the header.
  #[clap(long, env = "INPUT")]
  input: PathBuf,

  /// Return a non-zero exit status when the export fails instead of only logging it.
  #[clap(long, action)]
  strict: bool,

  #[clap(subcommand)]
  sink: Sink,
}

#[derive(Subcommand, Debug)]
enum Sink {
  /// Append to a MySQL table.
  Mysql {
    #[clap(flatten)]
    db: DbArgs,
  },
  /// Append to a PostgreSQL table using COPY.
  Postgres {
    #[clap(flatten)]
    db: DbArgs,
  },
  /// Append below the occupied rows of a Google Sheet.
  Sheets {
    /// Service account key file (JSON format).
    #[clap(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    service_account_file: PathBuf,

    #[clap(long, env = "SPREADSHEET_ID")]
    spreadsheet_id: String,

    #[clap(long, env = "SHEET_NAME", default_value = "Sheet1")]
    sheet: String,

    /// First column of the range used to count occupied rows.
    #[clap(long, default_value = "A")]
    start_column: String,

    /// Last column of the range used to count occupied rows.
    #[clap(long, default_value = "Z")]
    end_column: String,
  },
}

/// Connection settings shared by the relational sinks.
#[derive(Args, Debug)]
struct DbArgs {
  #[clap(long, env = "DB_USER")]
  user: String,

  #[clap(long, env = "DB_PASSWORD", hide_env_values = true)]
  password: String,

  #[clap(long, env = "DB_HOST", default_value = "localhost")]
  host: String,

  /// Defaults to 3306 for MySQL and 5432 for PostgreSQL.
  #[clap(long, env = "DB_PORT")]
  port: Option<u16>,

  #[clap(long, env = "DB_NAME")]
  database: Option<String>,

  /// Target table; rows are appended, the table is never created or replaced.
  #[clap(long, env = "DB_TABLE")]
  table: String,
}

impl DbArgs {
  fn credentials(&self) -> Credentials {
    Credentials {
      user: self.user.clone(),
      password: self.password.clone(),
      host: self.host.clone(),
      port: self.port,
      database: self.database.clone(),
    }
  }
}

#[tokio::main]
async fn main() -> AnyhowResult<()> {
  env_logger::init();

  let cli = Cli::parse();
  let policy = if cli.strict {
    FailurePolicy::Propagate
  } else {
    FailurePolicy::LogAndContinue
  };

  let dataset = Dataset::from_csv_path(&cli.input)?;
  info!(
    "Loaded {} row(s) with columns {:?} from {}",
    dataset.len(),
    dataset.column_names(),
    cli.input.display()
  );

  match cli.sink {
    Sink::Mysql { db } => {
      MySqlInserter::new(&db.credentials())
        .with_failure_policy(policy)
        .insert(&dataset, &db.table)
        .await?
    }
    Sink::Postgres { db } => {
      PostgresInserter::new(&db.credentials())
        .with_failure_policy(policy)
        .insert(&dataset, &db.table)
        .await?
    }
    Sink::Sheets {
      service_account_file,
      spreadsheet_id,
      sheet,
      start_column,
      end_column,
    } => {
      let range = SheetRange::new(spreadsheet_id, sheet, start_column, end_column);
      GoogleSheetsInserter::from_service_account_file(service_account_file)?
        .with_failure_policy(policy)
        .insert(&dataset, &range)
        .await?
    }
  }

  Ok(())
}
