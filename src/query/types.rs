use std::sync::Arc;

use crate::encoding::Value;
use crate::errors::DbError;

use super::filter::Filter;
use super::parse::parse_filter;
use super::project::Projection;
use super::sort::{Sort, SortField};

/// A parsed query: filter, optional sort, index hint, paging and projection.
#[derive(Debug, Clone)]
pub struct Query {
    pub filter: Arc<Filter>,
    pub sort: Option<Arc<Sort>>,
    pub hint: Option<String>,
    pub limit: Option<usize>,
    pub skip: usize,
    pub projection: Option<Arc<Projection>>,
}

impl Default for Query {
    fn default() -> Self {
        Self::new(Filter::All)
    }
}

impl Query {
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self {
            filter: Arc::new(filter),
            sort: None,
            hint: None,
            limit: None,
            skip: 0,
            projection: None,
        }
    }

    /// Parses a filter document and sort fields. Errors surface here, before
    /// any iteration happens.
    ///
    /// # Errors
    /// Returns `DbError::FilterParse` or `DbError::SortParse`.
    pub fn parse<S: AsRef<str>>(filter: &Value, sort: &[S]) -> Result<Self, DbError> {
        let mut q = Self::new(parse_filter(filter)?);
        let sort = Sort::parse(sort)?;
        if !sort.is_empty() {
            q.sort = Some(Arc::new(sort));
        }
        Ok(q)
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = if sort.is_empty() { None } else { Some(Arc::new(sort)) };
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(Arc::new(projection));
        self
    }

    /// Requested sort fields; empty when unsorted.
    #[must_use]
    pub fn sort_fields(&self) -> &[SortField] {
        self.sort.as_deref().map_or(&[], Sort::fields)
    }
}
