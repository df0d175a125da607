//! Search: parameter resolution and in-memory matching.
//!
//! [`resolve`] turns raw `(name, value)` pairs into a [`SearchQuery`] before the store takes
//! any lock. The store then evaluates the query against current versions with
//! [`SearchQuery::matches`] and slices the result into a [`SearchPage`].

mod matcher;
mod resolver;

pub use resolver::{
    resolve, Clause, DateComparator, DateValue, Predicate, ReferenceValue, SearchQuery,
    StringMode, TokenSystem, TokenValue,
};

use fhir::Resource;

/// One page of search results.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchPage {
    /// Matches on this page, ordered by id.
    pub resources: Vec<Resource>,
    /// Number of matches across all pages.
    pub total: usize,
    pub offset: usize,
    pub count: usize,
    /// Offset of the following page, if there is one.
    pub next_offset: Option<usize>,
}
