//! Integration tests for RecordStore
//!
//! Exercises schema synthesis and CRUD against real SQLite databases, both
//! in-memory and file backed.

use beacon_store::codec::{int_as_bool, null_as_nan};
use beacon_store::{
    Column, ColumnDefault, Filter, Page, Record, RecordDescriptor, RecordStore, Sort,
    SortOrder, SqliteConfig, SqlitePool, StoreError,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Counter {
    id: i64,
    mac: String,
    count: i32,
}

impl Counter {
    fn new(mac: &str, count: i32) -> Self {
        Self {
            id: 0,
            mac: mac.to_string(),
            count,
        }
    }
}

impl Record for Counter {
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor::new()
            .column(Column::string("mac").length(17))
            .column(Column::integer("count"))
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// Wider record: every column kind, declared in an order that differs from
/// the struct's field order.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Reading {
    id: i64,
    device: String,
    label: Option<String>,
    #[serde(deserialize_with = "null_as_nan")]
    temperature: f64,
    sequence: i64,
    day: NaiveDate,
    taken_at: NaiveDateTime,
}

impl Record for Reading {
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor::new()
            .column(Column::datetime("taken_at").comment("device clock"))
            .column(Column::date("day"))
            .column(Column::long("sequence"))
            .column(Column::double("temperature"))
            .column(Column::nullable_string("label").length(64))
            .column(Column::string("device").length(32).unique())
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

fn reading(device: &str, temperature: f64) -> Reading {
    let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    Reading {
        id: 0,
        device: device.to_string(),
        label: None,
        temperature,
        sequence: 9_000_000_000,
        day,
        taken_at: day.and_hms_opt(14, 30, 5).unwrap(),
    }
}

fn memory_store() -> RecordStore {
    RecordStore::new(SqlitePool::memory().expect("Failed to create memory pool"))
}

#[test]
fn test_counter_scenario() {
    let store = memory_store();
    assert!(store.define_schema::<Counter>("counters").unwrap());

    let mut counter = Counter::new("AA:BB", 5);
    let id = store.insert("counters", &mut counter).unwrap();
    assert_eq!(id, 1);
    assert_eq!(counter.id, 1);

    store
        .update("counters", 1, &Counter::new("AA:BB", 7))
        .unwrap();

    let loaded: Counter = store.query_by_id("counters", 1).unwrap().unwrap();
    assert_eq!(
        loaded,
        Counter {
            id: 1,
            mac: "AA:BB".to_string(),
            count: 7
        }
    );
}

#[test]
fn test_define_schema_is_idempotent() {
    let store = memory_store();
    assert!(store.define_schema::<Counter>("counters").unwrap());

    let mut counter = Counter::new("AA:BB", 1);
    store.insert("counters", &mut counter).unwrap();

    assert!(!store.define_schema::<Counter>("counters").unwrap());
    assert_eq!(store.count("counters", None).unwrap(), 1);
}

#[test]
fn test_insert_creates_table_lazily() {
    let store = memory_store();
    assert!(!store.table_exists("lazy").unwrap());

    let mut counter = Counter::new("CC:DD", 2);
    store.insert("lazy", &mut counter).unwrap();

    assert!(store.table_exists("lazy").unwrap());
    assert!(counter.id > 0);
}

#[test]
fn test_round_trip_all_kinds_by_name() {
    let store = memory_store();

    let mut original = reading("sensor-1", 21.25);
    original.label = Some("kitchen".to_string());
    store.insert("readings", &mut original).unwrap();
    assert!(original.id > 0);

    let loaded: Reading = store.query_by_id("readings", original.id).unwrap().unwrap();
    assert_eq!(loaded.id, original.id);
    assert_eq!(loaded.device, "sensor-1");
    assert_eq!(loaded.label.as_deref(), Some("kitchen"));
    assert_eq!(loaded.temperature, 21.25);
    assert_eq!(loaded.sequence, 9_000_000_000);
    assert_eq!(loaded.day, original.day);
    assert_eq!(loaded.taken_at, original.taken_at);
}

#[test]
fn test_nan_and_none_are_stored_as_null() {
    let store = memory_store();
    let mut original = reading("sensor-nan", f64::NAN);
    store.insert("readings", &mut original).unwrap();

    let nulls: i64 = store
        .pool()
        .with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM readings WHERE temperature IS NULL AND label IS NULL",
                [],
                |row| row.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(nulls, 1);

    let loaded: Reading = store.query_by_id("readings", original.id).unwrap().unwrap();
    assert!(loaded.temperature.is_nan());
    assert!(loaded.label.is_none());
}

#[test]
fn test_quotes_in_values_do_not_break_statements() {
    let store = memory_store();

    let tricky = "O'Brien\"); DROP TABLE counters; --";
    let mut counter = Counter::new(tricky, 1);
    store.insert("counters", &mut counter).unwrap();

    let found: Vec<Counter> = store
        .query_all(
            "counters",
            Some(&Filter::new("mac = ?").bind(tricky.to_string())),
            None,
            None,
        )
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].mac, tricky);
    assert!(store.table_exists("counters").unwrap());
}

#[test]
fn test_unique_constraint_rejects_duplicates() {
    let store = memory_store();
    store.insert("readings", &mut reading("dup", 1.0)).unwrap();

    let err = store.insert("readings", &mut reading("dup", 2.0)).unwrap_err();
    assert!(matches!(err, StoreError::Query(_)));
    assert_eq!(store.count("readings", None).unwrap(), 1);
}

#[test]
fn test_update_missing_row_is_not_found() {
    let store = memory_store();
    store.define_schema::<Counter>("counters").unwrap();

    let err = store
        .update("counters", 42, &Counter::new("AA", 1))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn test_query_filter_sort_limit() {
    let store = memory_store();
    for (mac, count) in [("a", 3), ("b", 9), ("c", 1), ("d", 7)] {
        store.insert("counters", &mut Counter::new(mac, count)).unwrap();
    }

    let mut seen = Vec::new();
    let delivered = store
        .query(
            "counters",
            Some(&Filter::new("count > ?").bind(2i64)),
            Some(&Sort::desc("count")),
            Some(2),
            |c: Counter| seen.push(c.mac),
        )
        .unwrap();
    assert_eq!(delivered, 2);
    assert_eq!(seen, ["b", "d"]);

    let first: Counter = store
        .query_first("counters", None, Some(&Sort::asc("count")))
        .unwrap()
        .unwrap();
    assert_eq!(first.mac, "c");

    let none: Option<Counter> = store
        .query_first("counters", Some(&Filter::eq("mac", "zz".to_string()).unwrap()), None)
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn test_query_page_reports_totals() {
    let store = memory_store();
    for i in 0..25 {
        store
            .insert("counters", &mut Counter::new(&format!("m{:02}", i), i))
            .unwrap();
    }

    let sort = Sort::asc("count").then("mac", SortOrder::Asc);
    let mut page_rows = Vec::new();
    let info = store
        .query_page(
            "counters",
            Page::new(3, 10),
            None,
            Some(&sort),
            |c: Counter| page_rows.push(c.count),
        )
        .unwrap();

    assert_eq!(info.total_rows, 25);
    assert_eq!(info.total_pages, 3);
    assert_eq!(info.rows, 5);
    assert!(!info.has_next());
    assert_eq!(page_rows, (20..25).collect::<Vec<_>>());

    let filtered = store
        .query_page(
            "counters",
            Page::new(1, 4),
            Some(&Filter::new("count < ?").bind(6i64)),
            Some(&sort),
            |_: Counter| {},
        )
        .unwrap();
    assert_eq!(filtered.total_rows, 6);
    assert_eq!(filtered.total_pages, 2);
    assert_eq!(filtered.rows, 4);
}

#[test]
fn test_delete_and_delete_by_filter() {
    let store = memory_store();
    let mut ids = Vec::new();
    for i in 0..5 {
        let mut counter = Counter::new("x", i);
        ids.push(store.insert("counters", &mut counter).unwrap());
    }

    assert_eq!(store.delete::<Counter>("counters", ids[0]).unwrap(), 1);
    assert_eq!(store.delete::<Counter>("counters", ids[0]).unwrap(), 0);

    let removed = store
        .delete_by_filter("counters", &Filter::new("count >= ?").bind(3i64))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.count("counters", None).unwrap(), 2);
}

#[test]
fn test_malformed_filter_is_a_statement_error() {
    let store = memory_store();
    store.define_schema::<Counter>("counters").unwrap();

    let result: Result<Vec<Counter>, _> = store.query_all(
        "counters",
        Some(&Filter::new("count >>> ?").bind(1i64)),
        None,
        None,
    );
    assert!(matches!(result, Err(StoreError::Query(_))));
}

#[test]
fn test_invalid_table_name_is_rejected_before_sql() {
    let store = memory_store();
    let err = store
        .insert("counters; DROP", &mut Counter::new("a", 1))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidIdentifier(_)));
}

#[test]
fn test_defaults_fill_missing_values() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Setting {
        id: i64,
        key: String,
        level: Option<i32>,
    }

    impl Record for Setting {
        fn descriptor() -> RecordDescriptor {
            RecordDescriptor::new()
                .column(Column::string("key"))
                .column(Column::integer("level").default_value(ColumnDefault::Integer(3)))
        }
        fn id(&self) -> i64 {
            self.id
        }
        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    let store = memory_store();
    let mut setting = Setting {
        id: 0,
        key: "verbosity".into(),
        level: None,
    };
    store.insert("settings", &mut setting).unwrap();

    let loaded: Setting = store.query_by_id("settings", setting.id).unwrap().unwrap();
    assert_eq!(loaded.level, Some(3));
}

#[test]
fn test_file_backed_store_persists_across_pools() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("beacon.db");

    {
        let store = RecordStore::new(SqlitePool::new(SqliteConfig::new(&path)).unwrap());
        store.insert("counters", &mut Counter::new("AA:BB", 5)).unwrap();
    }

    let store = RecordStore::new(SqlitePool::new(SqliteConfig::new(&path)).unwrap());
    assert!(!store.define_schema::<Counter>("counters").unwrap());
    let loaded: Counter = store.query_by_id("counters", 1).unwrap().unwrap();
    assert_eq!(loaded.count, 5);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Gateway {
    gateway_id: i64,
    mac: String,
    #[serde(deserialize_with = "int_as_bool")]
    online: bool,
}

impl Record for Gateway {
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor::new()
            .identity("gateway_id")
            .column(Column::string("mac").length(17))
            .column(Column::integer("online"))
    }

    fn id(&self) -> i64 {
        self.gateway_id
    }

    fn set_id(&mut self, id: i64) {
        self.gateway_id = id;
    }
}

fn gateway(mac: &str, online: bool) -> Gateway {
    Gateway {
        gateway_id: 0,
        mac: mac.to_string(),
        online,
    }
}

#[test]
fn test_bool_in_integer_column_reads_back() {
    let store = memory_store();
    let mut up = gateway("a4:cf:12:00:9e:01", true);
    let mut down = gateway("a4:cf:12:00:9e:02", false);
    store.insert("gateways", &mut up).unwrap();
    store.insert("gateways", &mut down).unwrap();

    let loaded: Gateway = store.query_by_id("gateways", up.gateway_id).unwrap().unwrap();
    assert_eq!(loaded, up);
    let loaded: Gateway = store.query_by_id("gateways", down.gateway_id).unwrap().unwrap();
    assert_eq!(loaded, down);

    let online = Filter::new("online = ?").bind(1i64);
    assert_eq!(store.count("gateways", Some(&online)).unwrap(), 1);
}

#[test]
fn test_delete_uses_custom_identity_column() {
    let store = memory_store();
    let mut first = gateway("a4:cf:12:00:9e:01", true);
    let mut second = gateway("a4:cf:12:00:9e:02", true);
    store.insert("gateways", &mut first).unwrap();
    store.insert("gateways", &mut second).unwrap();

    assert_eq!(store.delete::<Gateway>("gateways", first.gateway_id).unwrap(), 1);
    assert!(store
        .query_by_id::<Gateway>("gateways", first.gateway_id)
        .unwrap()
        .is_none());
    assert_eq!(store.count("gateways", None).unwrap(), 1);
}

#[test]
fn test_bool_in_text_column_is_rejected() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Note {
        id: i64,
        body: bool,
    }

    impl Record for Note {
        fn descriptor() -> RecordDescriptor {
            RecordDescriptor::new().column(Column::string("body"))
        }
        fn id(&self) -> i64 {
            self.id
        }
        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    let store = memory_store();
    let err = store
        .insert("notes", &mut Note { id: 0, body: true })
        .unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));
}
