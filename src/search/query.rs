//! Search query building and parsing

use crate::search::document::{IndexFields, CREATED_TICKS, LAST_MODIFIED_TICKS};
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// Field to sort by
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SearchSort {
    /// Most recently modified first
    #[default]
    LastModifiedDesc,
    /// Best text match first
    Relevance,
}

/// Search filter options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Filter by statuses (any of)
    pub statuses: Option<Vec<String>>,

    /// Filter by product ids (any of)
    pub product_ids: Option<Vec<String>>,

    /// Filter by owning organisation
    pub organisation_id: Option<String>,

    /// Include entities flagged as test data
    pub include_test_data: bool,

    /// Filter by modification range in ticks (inclusive)
    pub modified_after_ticks: Option<i64>,
    pub modified_before_ticks: Option<i64>,

    /// Filter by creation range in ticks (inclusive lower, exclusive upper)
    pub created_from_ticks: Option<i64>,
    pub created_to_ticks: Option<i64>,
}

/// Main search query structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free text matched against reference number, customer and product name
    pub query: String,

    /// Filters to apply
    pub filters: SearchFilter,

    /// Sorting criteria
    pub sort: SearchSort,

    /// Number of results to return
    pub limit: usize,

    /// Offset for pagination
    pub offset: usize,
}

impl SearchQuery {
    /// Create a new search query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilter::default(),
            sort: SearchSort::default(),
            limit: 20,
            offset: 0,
        }
    }

    /// Match every document
    pub fn all() -> Self {
        Self::new("")
    }

    /// Set filters
    pub fn with_filters(mut self, filters: SearchFilter) -> Self {
        self.filters = filters;
        self
    }

    /// Filter by status
    pub fn with_statuses(mut self, statuses: Vec<impl Into<String>>) -> Self {
        self.filters.statuses = Some(statuses.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Filter by product
    pub fn with_products(mut self, product_ids: Vec<impl Into<String>>) -> Self {
        self.filters.product_ids = Some(product_ids.into_iter().map(|p| p.into()).collect());
        self
    }

    /// Include test data in results
    pub fn with_test_data(mut self, include: bool) -> Self {
        self.filters.include_test_data = include;
        self
    }

    /// Filter by modification range
    pub fn with_modified_range(mut self, after: Option<i64>, before: Option<i64>) -> Self {
        self.filters.modified_after_ticks = after;
        self.filters.modified_before_ticks = before;
        self
    }

    /// Filter by creation window `[from, to)`
    pub fn with_created_window(mut self, from: i64, to: i64) -> Self {
        self.filters.created_from_ticks = Some(from);
        self.filters.created_to_ticks = Some(to);
        self
    }

    /// Set sorting
    pub fn with_sort(mut self, sort: SearchSort) -> Self {
        self.sort = sort;
        self
    }

    /// Set limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Query builder for constructing Tantivy queries over the entity schema
pub struct QueryBuilder<'a> {
    index: &'a tantivy::Index,
    fields: IndexFields,
}

impl<'a> QueryBuilder<'a> {
    /// Create a new query builder
    pub fn new(index: &'a tantivy::Index, fields: IndexFields) -> Self {
        Self { index, fields }
    }

    /// Build a Tantivy query from a SearchQuery
    pub fn build(
        &self,
        search_query: &SearchQuery,
    ) -> Result<Box<dyn tantivy::query::Query>, tantivy::query::QueryParserError> {
        use tantivy::query::*;

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        if !search_query.query.trim().is_empty() {
            let mut query_parser = QueryParser::for_index(self.index, self.fields.text_fields());
            query_parser.set_conjunction_by_default();
            let parsed_query = query_parser.parse_query(&search_query.query)?;
            subqueries.push((Occur::Must, parsed_query));
        }

        let filters = &search_query.filters;

        if let Some(ref statuses) = filters.statuses {
            if let Some(query) = self.any_term(self.fields.status, statuses) {
                subqueries.push((Occur::Must, query));
            }
        }

        if let Some(ref product_ids) = filters.product_ids {
            if let Some(query) = self.any_term(self.fields.product_id, product_ids) {
                subqueries.push((Occur::Must, query));
            }
        }

        if let Some(ref organisation_id) = filters.organisation_id {
            subqueries.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    tantivy::Term::from_field_text(self.fields.organisation_id, organisation_id),
                    tantivy::schema::IndexRecordOption::Basic,
                )),
            ));
        }

        if !filters.include_test_data {
            subqueries.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    tantivy::Term::from_field_bool(self.fields.is_test_data, false),
                    tantivy::schema::IndexRecordOption::Basic,
                )),
            ));
        }

        if filters.modified_after_ticks.is_some() || filters.modified_before_ticks.is_some() {
            subqueries.push((
                Occur::Must,
                Box::new(RangeQuery::new_i64_bounds(
                    LAST_MODIFIED_TICKS.to_string(),
                    filters
                        .modified_after_ticks
                        .map_or(Bound::Unbounded, Bound::Included),
                    filters
                        .modified_before_ticks
                        .map_or(Bound::Unbounded, Bound::Included),
                )),
            ));
        }

        if filters.created_from_ticks.is_some() || filters.created_to_ticks.is_some() {
            subqueries.push((
                Occur::Must,
                Box::new(created_window_query(
                    filters.created_from_ticks,
                    filters.created_to_ticks,
                )),
            ));
        }

        match subqueries.len() {
            0 => Ok(Box::new(AllQuery)),
            1 => Ok(subqueries.remove(0).1),
            _ => Ok(Box::new(BooleanQuery::from(subqueries))),
        }
    }

    fn any_term(
        &self,
        field: tantivy::schema::Field,
        values: &[String],
    ) -> Option<Box<dyn tantivy::query::Query>> {
        use tantivy::query::*;

        let clauses: Vec<(Occur, Box<dyn Query>)> = values
            .iter()
            .map(|value| {
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    tantivy::Term::from_field_text(field, value),
                    tantivy::schema::IndexRecordOption::Basic,
                ));
                (Occur::Should, query)
            })
            .collect();

        if clauses.is_empty() {
            None
        } else {
            Some(Box::new(BooleanQuery::from(clauses)))
        }
    }
}

/// Creation window `[from, to)` over `created_ticks`
pub(crate) fn created_window_query(from: Option<i64>, to: Option<i64>) -> tantivy::query::RangeQuery {
    tantivy::query::RangeQuery::new_i64_bounds(
        CREATED_TICKS.to_string(),
        from.map_or(Bound::Unbounded, Bound::Included),
        to.map_or(Bound::Unbounded, Bound::Excluded),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_builder() {
        let query = SearchQuery::new("jane")
            .with_statuses(vec!["Active", "Cancelled"])
            .with_limit(50)
            .with_offset(10);

        assert_eq!(query.query, "jane");
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 10);
        assert_eq!(query.filters.statuses.as_ref().unwrap().len(), 2);
        assert!(!query.filters.include_test_data);
    }

    #[test]
    fn test_created_window() {
        let query = SearchQuery::all().with_created_window(10, 20);
        assert_eq!(query.filters.created_from_ticks, Some(10));
        assert_eq!(query.filters.created_to_ticks, Some(20));
    }
}
