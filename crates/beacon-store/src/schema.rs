//! Schema synthesis from record descriptors

use crate::descriptor::{quote_identifier, Column, ColumnDefault, ColumnKind, RecordDescriptor};
use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Whether `table` is present in the catalog. Never cached.
pub fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Create `table` for `descriptor` unless it already exists.
///
/// Returns `true` when the table was created by this call.
pub fn ensure_table(
    conn: &Connection,
    table: &str,
    descriptor: &RecordDescriptor,
) -> StoreResult<bool> {
    if table_exists(conn, table)? {
        debug!(table, "Table already present");
        return Ok(false);
    }

    let ddl = create_table_sql(table, descriptor)?;
    debug!(table, %ddl, "Creating table");
    conn.execute_batch(&ddl)
        .map_err(|e| StoreError::Schema(format!("Failed to create table {}: {}", table, e)))?;

    info!(table, columns = descriptor.columns().len(), "Table created");
    Ok(true)
}

/// Render `CREATE TABLE IF NOT EXISTS` for a descriptor
pub fn create_table_sql(table: &str, descriptor: &RecordDescriptor) -> StoreResult<String> {
    descriptor.validate()?;
    let table = quote_identifier(table)?;

    let mut lines: Vec<(String, Option<String>)> = Vec::with_capacity(descriptor.columns().len() + 2);
    lines.push((
        format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_identifier(descriptor.identity_name())?
        ),
        None,
    ));

    for column in descriptor.columns() {
        lines.push((column_definition(column)?, column.comment.as_deref().map(one_line)));
    }

    let unique: Vec<String> = descriptor
        .unique_columns()
        .map(|c| quote_identifier(&c.name))
        .collect::<StoreResult<_>>()?;
    if !unique.is_empty() {
        lines.push((format!("UNIQUE ({})", unique.join(", ")), None));
    }

    let last = lines.len() - 1;
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", table);
    for (i, (definition, comment)) in lines.into_iter().enumerate() {
        sql.push_str("    ");
        sql.push_str(&definition);
        if i != last {
            sql.push(',');
        }
        if let Some(comment) = comment {
            sql.push_str(" -- ");
            sql.push_str(&comment);
        }
        sql.push('\n');
    }
    sql.push_str(");");
    Ok(sql)
}

fn column_definition(column: &Column) -> StoreResult<String> {
    let mut definition = format!(
        "{} {}",
        quote_identifier(&column.name)?,
        column.kind.sql_type(column.length)
    );
    if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        definition.push_str(" DEFAULT ");
        definition.push_str(&default_literal(column.kind, default));
    }
    Ok(definition)
}

fn default_literal(kind: ColumnKind, default: &ColumnDefault) -> String {
    match default {
        ColumnDefault::Integer(value) => value.to_string(),
        ColumnDefault::Double(value) if value.is_finite() => format!("{:?}", value),
        ColumnDefault::Double(_) => "NULL".to_string(),
        ColumnDefault::Text(text) => format!("'{}'", text.replace('\'', "''")),
        ColumnDefault::Now => match kind {
            ColumnKind::Date => "CURRENT_DATE".to_string(),
            _ => "(strftime('%Y-%m-%dT%H:%M:%S', 'now'))".to_string(),
        },
    }
}

fn one_line(comment: &str) -> String {
    comment.replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading_descriptor() -> RecordDescriptor {
        RecordDescriptor::new()
            .column(Column::string("mac").length(17).unique().comment("device MAC"))
            .column(Column::integer("count").default_value(ColumnDefault::Integer(0)))
            .column(Column::nullable_string("label"))
            .column(Column::datetime("seen_at").default_value(ColumnDefault::Now))
            .column(Column::long("tenant").unique())
    }

    #[test]
    fn test_create_table_sql_layout() {
        let sql = create_table_sql("readings", &reading_descriptor()).unwrap();

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"readings\" ("));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT,"));
        assert!(sql.contains("\"mac\" VARCHAR(17) NOT NULL, -- device MAC"));
        assert!(sql.contains("\"count\" INTEGER NOT NULL DEFAULT 0,"));
        assert!(sql.contains("\"label\" VARCHAR(255),"));
        assert!(sql.contains("UNIQUE (\"mac\", \"tenant\")"));

        // declared order is kept
        let mac = sql.find("\"mac\"").unwrap();
        let count = sql.find("\"count\"").unwrap();
        let label = sql.find("\"label\"").unwrap();
        assert!(mac < count && count < label);
    }

    #[test]
    fn test_text_default_is_quoted() {
        let descriptor = RecordDescriptor::new()
            .column(Column::string("owner").default_value(ColumnDefault::Text("o'brien".into())));
        let sql = create_table_sql("t", &descriptor).unwrap();
        assert!(sql.contains("DEFAULT 'o''brien'"));
    }

    #[test]
    fn test_multiline_comment_stays_on_one_line() {
        let descriptor =
            RecordDescriptor::new().column(Column::integer("n").comment("first\nsecond"));
        let sql = create_table_sql("t", &descriptor).unwrap();
        assert!(sql.contains("-- first second\n"));

        let conn = Connection::open_in_memory().unwrap();
        assert!(ensure_table(&conn, "t", &descriptor).unwrap());
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let result = create_table_sql("bad name", &reading_descriptor());
        assert!(matches!(result, Err(StoreError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let descriptor = reading_descriptor();

        assert!(!table_exists(&conn, "readings").unwrap());
        assert!(ensure_table(&conn, "readings", &descriptor).unwrap());
        assert!(!ensure_table(&conn, "readings", &descriptor).unwrap());
        assert!(table_exists(&conn, "readings").unwrap());
    }

    #[test]
    fn test_defaults_apply() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_table(&conn, "readings", &reading_descriptor()).unwrap();

        conn.execute(
            "INSERT INTO readings (mac, tenant) VALUES ('AA:BB', 1)",
            [],
        )
        .unwrap();

        let (count, seen_at): (i64, String) = conn
            .query_row("SELECT count, seen_at FROM readings", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(seen_at.len(), "2024-01-01T00:00:00".len());
        assert_eq!(&seen_at[10..11], "T");
    }
}
