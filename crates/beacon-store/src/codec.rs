//! Mapping between records and SQL values
//!
//! Records go through their serde representation: encoding looks each
//! descriptor column up by name in the serialized map, decoding builds a map
//! keyed by the row's column names and deserializes the record from it.

use crate::descriptor::{Column, ColumnKind, Record, RecordDescriptor};
use crate::error::{StoreError, StoreResult};
use rusqlite::types::{Value, ValueRef};
use rusqlite::Row;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value as JsonValue};

/// One column value ready to bind
#[derive(Debug, Clone, PartialEq)]
pub struct BoundValue<'d> {
    pub column: &'d Column,
    pub value: Value,
}

/// Encode every non-identity column of `record`.
///
/// With `omit_defaulted_nulls`, columns whose value is NULL but which declare
/// a default are left out so that the default applies on insert.
pub fn encode<'d, R: Record>(
    record: &R,
    descriptor: &'d RecordDescriptor,
    omit_defaulted_nulls: bool,
) -> StoreResult<Vec<BoundValue<'d>>> {
    let map = match serde_json::to_value(record)? {
        JsonValue::Object(map) => map,
        other => {
            return Err(StoreError::Serialization(format!(
                "record must serialize to a map, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut bound = Vec::with_capacity(descriptor.columns().len());
    for column in descriptor.columns() {
        let json = map.get(&column.name).ok_or_else(|| {
            StoreError::Serialization(format!("record has no field {:?}", column.name))
        })?;
        let value = to_sql_value(column, json)?;
        if omit_defaulted_nulls && value == Value::Null && column.default.is_some() {
            continue;
        }
        bound.push(BoundValue { column, value });
    }
    Ok(bound)
}

fn to_sql_value(column: &Column, json: &JsonValue) -> StoreResult<Value> {
    let mismatch = || {
        StoreError::Serialization(format!(
            "field {:?} holds {} which does not fit a {:?} column",
            column.name,
            json_kind(json),
            column.kind
        ))
    };

    let value = match (column.kind, json) {
        (_, JsonValue::Null) => Value::Null,

        (ColumnKind::Integer | ColumnKind::Long, JsonValue::Number(n)) => {
            match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => return Err(mismatch()),
            }
        }
        (ColumnKind::Integer | ColumnKind::Long, JsonValue::Bool(b)) => Value::Integer(*b as i64),

        (ColumnKind::Double, JsonValue::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() => Value::Real(f),
            _ => Value::Null,
        },

        (kind, _) if kind.is_numeric() => return Err(mismatch()),

        (_, JsonValue::String(s)) => Value::Text(s.clone()),
        // would read back as a string the field cannot deserialize from
        (_, _) => return Err(mismatch()),
    };
    Ok(value)
}

/// Decode the current row into `R` by column name
pub fn decode_row<R: Record>(row: &Row<'_>, column_names: &[String]) -> StoreResult<R> {
    let mut map = Map::with_capacity(column_names.len());
    for (index, name) in column_names.iter().enumerate() {
        let json = match row.get_ref(index)? {
            ValueRef::Null => JsonValue::Null,
            ValueRef::Integer(i) => JsonValue::Number(i.into()),
            ValueRef::Real(f) => Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ValueRef::Text(bytes) => JsonValue::String(
                std::str::from_utf8(bytes)
                    .map_err(|e| {
                        StoreError::Serialization(format!("column {:?} is not UTF-8: {}", name, e))
                    })?
                    .to_string(),
            ),
            ValueRef::Blob(bytes) => {
                JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect())
            }
        };
        map.insert(name.clone(), json);
    }
    serde_json::from_value(JsonValue::Object(map)).map_err(Into::into)
}

/// Read a NULL double back as NaN.
///
/// Use as `#[serde(deserialize_with = "beacon_store::codec::null_as_nan")]`
/// on `f64` fields that may hold NaN.
pub fn null_as_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Read an integer column back as a bool.
///
/// Bools are stored as 0 or 1 in integer columns and come back as numbers;
/// use as `#[serde(deserialize_with = "beacon_store::codec::int_as_bool")]`.
pub fn int_as_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Bool(b) => Ok(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(D::Error::custom(format!("{} is not a boolean flag", n))),
        },
        other => Err(D::Error::custom(format!(
            "expected a boolean flag, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ColumnDefault;
    use serde::Serialize;

    #[derive(Debug, Serialize, serde::Deserialize, PartialEq)]
    struct Sample {
        id: i64,
        count: i32,
        temp: f64,
        note: Option<String>,
        tag: String,
    }

    impl Record for Sample {
        fn descriptor() -> RecordDescriptor {
            RecordDescriptor::new()
                .column(Column::integer("count").default_value(ColumnDefault::Integer(1)))
                .column(Column::double("temp"))
                .column(Column::nullable_string("note"))
                .column(Column::string("tag"))
        }
        fn id(&self) -> i64 {
            self.id
        }
        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn sample() -> Sample {
        Sample {
            id: 9,
            count: 4,
            temp: f64::NAN,
            note: None,
            tag: "it's".into(),
        }
    }

    #[test]
    fn test_encode_skips_identity_and_maps_kinds() {
        let descriptor = Sample::descriptor();
        let bound = encode(&sample(), &descriptor, false).unwrap();

        let names: Vec<&str> = bound.iter().map(|b| b.column.name.as_str()).collect();
        assert_eq!(names, ["count", "temp", "note", "tag"]);
        assert_eq!(bound[0].value, Value::Integer(4));
        assert_eq!(bound[1].value, Value::Null);
        assert_eq!(bound[2].value, Value::Null);
        assert_eq!(bound[3].value, Value::Text("it's".to_string()));
    }

    #[test]
    fn test_encode_omits_defaulted_nulls() {
        #[derive(Serialize, serde::Deserialize)]
        struct Partial {
            id: i64,
            count: Option<i32>,
        }
        impl Record for Partial {
            fn descriptor() -> RecordDescriptor {
                RecordDescriptor::new()
                    .column(Column::integer("count").default_value(ColumnDefault::Integer(1)))
            }
            fn id(&self) -> i64 {
                self.id
            }
            fn set_id(&mut self, id: i64) {
                self.id = id;
            }
        }

        let descriptor = Partial::descriptor();
        let record = Partial { id: 0, count: None };
        assert!(encode(&record, &descriptor, true).unwrap().is_empty());
        assert_eq!(encode(&record, &descriptor, false).unwrap().len(), 1);
    }

    #[test]
    fn test_encode_reports_missing_field() {
        let descriptor = Sample::descriptor().column(Column::integer("absent"));
        let err = encode(&sample(), &descriptor, false).unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn test_encode_rejects_text_in_numeric_column() {
        let descriptor = RecordDescriptor::new().column(Column::integer("tag"));
        assert!(matches!(
            encode(&sample(), &descriptor, false),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_null_as_nan() {
        #[derive(serde::Deserialize)]
        struct Gauge {
            #[serde(deserialize_with = "null_as_nan")]
            temp: f64,
        }
        let gauge: Gauge = serde_json::from_str(r#"{"temp": null}"#).unwrap();
        assert!(gauge.temp.is_nan());
        let gauge: Gauge = serde_json::from_str(r#"{"temp": 21.5}"#).unwrap();
        assert_eq!(gauge.temp, 21.5);
    }

    #[test]
    fn test_int_as_bool() {
        #[derive(serde::Deserialize)]
        struct Flag {
            #[serde(deserialize_with = "int_as_bool")]
            online: bool,
        }
        let flag: Flag = serde_json::from_str(r#"{"online": 1}"#).unwrap();
        assert!(flag.online);
        let flag: Flag = serde_json::from_str(r#"{"online": 0}"#).unwrap();
        assert!(!flag.online);
        let flag: Flag = serde_json::from_str(r#"{"online": true}"#).unwrap();
        assert!(flag.online);
        assert!(serde_json::from_str::<Flag>(r#"{"online": 2}"#).is_err());
        assert!(serde_json::from_str::<Flag>(r#"{"online": "yes"}"#).is_err());
    }

    #[test]
    fn test_encode_rejects_non_text_in_text_column() {
        #[derive(Serialize, serde::Deserialize)]
        struct Loose {
            id: i64,
            label: bool,
            version: i64,
        }
        impl Record for Loose {
            fn descriptor() -> RecordDescriptor {
                RecordDescriptor::new()
            }
            fn id(&self) -> i64 {
                self.id
            }
            fn set_id(&mut self, id: i64) {
                self.id = id;
            }
        }
        let record = Loose {
            id: 0,
            label: true,
            version: 3,
        };
        for column in ["label", "version"] {
            let descriptor = RecordDescriptor::new().column(Column::string(column));
            assert!(matches!(
                encode(&record, &descriptor, false),
                Err(StoreError::Serialization(_))
            ));
        }
    }
}
