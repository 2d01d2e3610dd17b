//! Filter, sort and paging arguments for queries

use crate::descriptor::quote_identifier;
use crate::error::StoreResult;
use rusqlite::types::Value;

/// A `WHERE` fragment with `?` placeholders and the values bound to them.
///
/// The fragment itself is written by the caller and passed through as-is;
/// values always travel as bound parameters.
///
/// ```rust,ignore
/// let filter = Filter::new("mac = ? AND count > ?")
///     .bind("AA:BB".to_string())
///     .bind(3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    clause: String,
    params: Vec<Value>,
}

impl Filter {
    pub fn new(clause: impl Into<String>) -> Self {
        Self {
            clause: clause.into(),
            params: Vec::new(),
        }
    }

    /// Shorthand for `column = ?`
    pub fn eq(column: &str, value: impl Into<Value>) -> StoreResult<Self> {
        Ok(Self::new(format!("{} = ?", quote_identifier(column)?)).bind(value))
    }

    /// Bind the next placeholder
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// `ORDER BY` terms; column names are validated identifiers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sort {
    terms: Vec<(String, SortOrder)>,
}

impl Sort {
    pub fn asc(column: impl Into<String>) -> Self {
        Self::default().then(column, SortOrder::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::default().then(column, SortOrder::Desc)
    }

    pub fn then(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.terms.push((column.into(), order));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Render the terms after `ORDER BY`
    pub fn to_sql(&self) -> StoreResult<String> {
        let terms = self
            .terms
            .iter()
            .map(|(column, order)| {
                let direction = match order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                };
                Ok(format!("{} {}", quote_identifier(column)?, direction))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(terms.join(", "))
    }
}

/// A 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

impl Page {
    /// Page numbers below 1 are treated as the first page, sizes below 1 as 1
    pub fn new(number: u64, size: u64) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.number - 1).saturating_mul(self.size)
    }
}

/// Paging result reported by `query_page`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page: u64,
    pub page_size: u64,
    pub total_rows: u64,
    pub total_pages: u64,
    /// Rows delivered for this page
    pub rows: u64,
}

impl PageInfo {
    pub fn new(page: Page, total_rows: u64, rows: u64) -> Self {
        Self {
            page: page.number,
            page_size: page.size,
            total_rows,
            total_pages: total_rows.div_ceil(page.size),
            rows,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}
