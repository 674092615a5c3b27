//! Append-only response store.
//!
//! Every fetch attempt, successful or not, becomes one row in the `web` table
//! and rows are never updated or deleted by this crate. "The most recent
//! capture of a URL" is therefore well defined: the matching row with the
//! highest `id`, independent of any clock skew between the machines that
//! wrote the rows.
//!
//! # Architecture
//! - [`Database`] owns the SQLite pool and the embedded migrations.
//! - [`Repository`] is the query surface. It canonicalizes every URL it is
//!   given (see [`hermes_canon`]) and frames/unframes bodies with
//!   [`hermes_compress`], so callers only ever see canonical URLs and
//!   decompressed text.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{Capture, FetchRecord, STATUS_OK, STATUS_REQUEST_ERROR};
pub use crate::repo::{Filter, Repository};
pub use hermes_canon::AliasPattern;
