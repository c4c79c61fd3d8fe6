//! # Connection Targets for Relational Sinks
//!
//! This module turns discrete credentials into the connection URL each relational driver expects
//! (`mysql://...` for `mysql_async`, `postgresql://...` for `tokio-postgres`). Building a URL is
//! pure string assembly; malformed credentials are only discovered when a connection is opened.
//!
//! ## Submodules
//!
//! - **credentials**: Defines `Credentials`, `Dialect` and the URL builders.

mod credentials;

pub use credentials::{build_url, redacted_url, Credentials, Dialect};
