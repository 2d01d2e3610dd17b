//! CRUD over descriptor-defined tables
//!
//! Every operation is synchronous and meant to run on a task pool worker.
//! Failures are logged where they happen and returned; nothing is retried.

use crate::codec::{self, BoundValue};
use crate::connection::SqlitePool;
use crate::descriptor::{quote_identifier, Record};
use crate::error::{StoreError, StoreResult};
use crate::filter::{Filter, Page, PageInfo, Sort};
use crate::schema;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, warn};

/// Record store over a shared SQLite connection
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create `table` for `R` if it does not exist yet.
    ///
    /// Returns `true` when this call created the table.
    pub fn define_schema<R: Record>(&self, table: &str) -> StoreResult<bool> {
        let descriptor = R::descriptor();
        self.pool
            .with_connection(|conn| schema::ensure_table(conn, table, &descriptor))
            .inspect_err(|e| warn!(table, error = %e, "define_schema failed"))
    }

    pub fn table_exists(&self, table: &str) -> StoreResult<bool> {
        self.pool
            .with_connection(|conn| schema::table_exists(conn, table))
    }

    pub fn drop_table(&self, table: &str) -> StoreResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_identifier(table)?);
        self.pool.with_connection(|conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
    }

    /// Insert `record`, creating the table first if needed.
    ///
    /// The store-assigned identity is written back into `record` and
    /// returned.
    pub fn insert<R: Record>(&self, table: &str, record: &mut R) -> StoreResult<i64> {
        let descriptor = R::descriptor();
        let bound = codec::encode(record, &descriptor, true)?;
        let table_ident = quote_identifier(table)?;

        let sql = if bound.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table_ident)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table_ident,
                column_list(&bound)?,
                placeholders(bound.len())
            )
        };

        let id = self
            .pool
            .with_connection(|conn| {
                schema::ensure_table(conn, table, &descriptor)?;
                conn.execute(&sql, params_from_iter(bound.iter().map(|b| &b.value)))?;
                Ok(conn.last_insert_rowid())
            })
            .inspect_err(|e| warn!(table, error = %e, "insert failed"))?;

        record.set_id(id);
        debug!(table, id, "Inserted record");
        Ok(id)
    }

    /// Overwrite every non-identity column of row `id`. Last writer wins.
    pub fn update<R: Record>(&self, table: &str, id: i64, record: &R) -> StoreResult<usize> {
        let descriptor = R::descriptor();
        let bound = codec::encode(record, &descriptor, false)?;
        if bound.is_empty() {
            return Ok(0);
        }

        let assignments = bound
            .iter()
            .map(|b| Ok(format!("{} = ?", quote_identifier(&b.column.name)?)))
            .collect::<StoreResult<Vec<_>>>()?
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_identifier(table)?,
            assignments,
            quote_identifier(descriptor.identity_name())?
        );

        let mut params: Vec<Value> = bound.into_iter().map(|b| b.value).collect();
        params.push(Value::Integer(id));

        let affected = self
            .pool
            .with_connection(|conn| {
                schema::ensure_table(conn, table, &descriptor)?;
                Ok(conn.execute(&sql, params_from_iter(params.iter()))?)
            })
            .inspect_err(|e| warn!(table, id, error = %e, "update failed"))?;

        if affected == 0 {
            return Err(StoreError::NotFound(format!("{} row {}", table, id)));
        }
        Ok(affected)
    }

    /// Delete row `id` of an `R` table, returning the number of rows removed
    pub fn delete<R: Record>(&self, table: &str, id: i64) -> StoreResult<usize> {
        let descriptor = R::descriptor();
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_identifier(table)?,
            quote_identifier(descriptor.identity_name())?
        );
        self.pool
            .with_connection(|conn| Ok(conn.execute(&sql, [id])?))
            .inspect_err(|e| warn!(table, id, error = %e, "delete failed"))
    }

    /// Delete every row matching `filter`
    pub fn delete_by_filter(&self, table: &str, filter: &Filter) -> StoreResult<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_identifier(table)?,
            filter.clause()
        );
        self.pool
            .with_connection(|conn| Ok(conn.execute(&sql, params_from_iter(filter.params()))?))
            .inspect_err(|e| warn!(table, error = %e, "delete_by_filter failed"))
    }

    /// Count rows, optionally restricted by `filter`
    pub fn count(&self, table: &str, filter: Option<&Filter>) -> StoreResult<u64> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?);
        let params = push_where(&mut sql, filter);
        self.pool
            .with_connection(|conn| {
                let n: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
                Ok(n as u64)
            })
            .inspect_err(|e| warn!(table, error = %e, "count failed"))
    }

    /// Stream matching rows to `consumer`, returning how many were delivered
    pub fn query<R, F>(
        &self,
        table: &str,
        filter: Option<&Filter>,
        sort: Option<&Sort>,
        limit: Option<u64>,
        consumer: F,
    ) -> StoreResult<usize>
    where
        R: Record,
        F: FnMut(R),
    {
        let (mut sql, params) = select_sql(table, filter, sort)?;
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        self.pool
            .with_connection(|conn| stream_rows(conn, &sql, &params, consumer))
            .inspect_err(|e| warn!(table, error = %e, "query failed"))
    }

    /// Collecting form of [`RecordStore::query`]
    pub fn query_all<R: Record>(
        &self,
        table: &str,
        filter: Option<&Filter>,
        sort: Option<&Sort>,
        limit: Option<u64>,
    ) -> StoreResult<Vec<R>> {
        let mut rows = Vec::new();
        self.query(table, filter, sort, limit, |record| rows.push(record))?;
        Ok(rows)
    }

    /// Stream one page of matching rows and report paging totals.
    ///
    /// Pages are 1-based; the offset is `(page - 1) * size`.
    pub fn query_page<R, F>(
        &self,
        table: &str,
        page: Page,
        filter: Option<&Filter>,
        sort: Option<&Sort>,
        consumer: F,
    ) -> StoreResult<PageInfo>
    where
        R: Record,
        F: FnMut(R),
    {
        let mut count_sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?);
        let count_params = push_where(&mut count_sql, filter);

        let (mut sql, params) = select_sql(table, filter, sort)?;
        sql.push_str(&format!(" LIMIT {} OFFSET {}", page.size, page.offset()));

        self.pool
            .with_connection(|conn| {
                let total: i64 =
                    conn.query_row(&count_sql, params_from_iter(count_params), |row| row.get(0))?;
                let rows = stream_rows(conn, &sql, &params, consumer)?;
                Ok(PageInfo::new(page, total as u64, rows as u64))
            })
            .inspect_err(|e| warn!(table, page = page.number, error = %e, "query_page failed"))
    }

    pub fn query_by_id<R: Record>(&self, table: &str, id: i64) -> StoreResult<Option<R>> {
        let identity = R::descriptor().identity_name().to_string();
        let filter = Filter::eq(&identity, id)?;
        self.query_first(table, Some(&filter), None)
    }

    /// First row matching `filter` in `sort` order
    pub fn query_first<R: Record>(
        &self,
        table: &str,
        filter: Option<&Filter>,
        sort: Option<&Sort>,
    ) -> StoreResult<Option<R>> {
        let mut first = None;
        self.query(table, filter, sort, Some(1), |record| first = Some(record))?;
        Ok(first)
    }
}

fn column_list(bound: &[BoundValue<'_>]) -> StoreResult<String> {
    Ok(bound
        .iter()
        .map(|b| quote_identifier(&b.column.name))
        .collect::<StoreResult<Vec<_>>>()?
        .join(", "))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn push_where<'f>(sql: &mut String, filter: Option<&'f Filter>) -> &'f [Value] {
    match filter {
        Some(filter) => {
            sql.push_str(" WHERE ");
            sql.push_str(filter.clause());
            filter.params()
        }
        None => &[],
    }
}

fn select_sql<'f>(
    table: &str,
    filter: Option<&'f Filter>,
    sort: Option<&Sort>,
) -> StoreResult<(String, &'f [Value])> {
    let mut sql = format!("SELECT * FROM {}", quote_identifier(table)?);
    let params = push_where(&mut sql, filter);
    if let Some(sort) = sort.filter(|s| !s.is_empty()) {
        sql.push_str(" ORDER BY ");
        sql.push_str(&sort.to_sql()?);
    }
    Ok((sql, params))
}

fn stream_rows<R, F>(conn: &Connection, sql: &str, params: &[Value], mut consumer: F) -> StoreResult<usize>
where
    R: Record,
    F: FnMut(R),
{
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params))?;

    let mut delivered = 0;
    while let Some(row) = rows.next()? {
        consumer(codec::decode_row(row, &column_names)?);
        delivered += 1;
    }
    Ok(delivered)
}
