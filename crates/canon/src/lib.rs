//! URL canonicalization for the fetch log.
//!
//! Every URL written to or looked up in the response store passes through a
//! [`Canonicalizer`] first, so that trivially different spellings of the same
//! address (doubled slashes, a trailing slash) land on the same records.
//!
//! [`AliasPattern`]s are the wildcard counterpart: a pattern derived from a
//! URL whose slug (a title or display name) may have changed over time while
//! the numeric resource ID it trails stayed put.

mod alias;
mod canonical;
pub mod error;

pub use crate::alias::AliasPattern;
pub use crate::canonical::{Canonicalizer, DEFAULT_PRESERVE_TRAILING_SLASH};
