//! Turning result cursors into entities.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::ValueRef;
use uuid::Uuid;

use crate::config::ColumnMatching;
use crate::entity::{Entity, Record};
use crate::error::{Error, Result};
use crate::schema::{ColumnDescriptor, TableDescriptor};
use crate::types::{HostType, Value, DATETIME_FORMAT, TIME_FORMAT};

/// Copy a cell out of the engine's cursor.
pub(crate) fn raw_value(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        // text that is not UTF-8 stays raw bytes; only byte columns accept it
        ValueRef::Text(t) => match std::str::from_utf8(t) {
            Ok(text) => Value::Text(text.to_owned()),
            Err(_) => Value::Blob(t.to_vec()),
        },
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Map each cursor column onto a descriptor column.
pub fn map_columns(
    table: &TableDescriptor,
    cursor_columns: &[String],
    matching: ColumnMatching,
) -> Result<Vec<usize>> {
    cursor_columns
        .iter()
        .map(|name| {
            table
                .find_column(name, matching)
                .ok_or_else(|| Error::UnknownColumn(format!("{}.{name}", table.name)))
        })
        .collect()
}

fn unsupported(column: &ColumnDescriptor, raw: &Value) -> Error {
    Error::conversion(
        &column.name,
        format!("cannot read {raw:?} as {}", column.host_type),
    )
}

fn integer_range(host: &HostType) -> (i128, i128) {
    match host {
        HostType::U8 => (0, u8::MAX as i128),
        HostType::U16 => (0, u16::MAX as i128),
        HostType::U32 => (0, u32::MAX as i128),
        HostType::I8 => (i8::MIN as i128, i8::MAX as i128),
        HostType::I16 => (i16::MIN as i128, i16::MAX as i128),
        HostType::I32 => (i32::MIN as i128, i32::MAX as i128),
        // u64 is stored bit-for-bit in the signed column
        _ => (i64::MIN as i128, i64::MAX as i128),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Coerce a raw cell to the column's declared host type.
pub fn coerce(column: &ColumnDescriptor, raw: Value) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let host = column.host_type.unwrapped();
    let coerced = match (host, &raw) {
        (h, _) if h.is_integer() => {
            let wide = match &raw {
                Value::Integer(i) => *i,
                Value::Real(r) if r.fract() == 0.0 => {
                    if !(i64::MIN as f64..i64::MAX as f64).contains(r) {
                        return Err(Error::conversion(
                            &column.name,
                            format!("{r} out of range for {h}"),
                        ));
                    }
                    *r as i64
                }
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| unsupported(column, &raw))?,
                _ => return Err(unsupported(column, &raw)),
            };
            let (min, max) = integer_range(h);
            if (wide as i128) < min || (wide as i128) > max {
                return Err(Error::conversion(
                    &column.name,
                    format!("{wide} out of range for {h}"),
                ));
            }
            Value::Integer(wide)
        }
        (HostType::F32 | HostType::F64 | HostType::Decimal, Value::Integer(i)) => {
            Value::Real(*i as f64)
        }
        (HostType::F32 | HostType::F64 | HostType::Decimal, Value::Real(_)) => raw.clone(),
        (HostType::F32 | HostType::F64 | HostType::Decimal, Value::Text(s)) => {
            Value::Real(s.trim().parse::<f64>().map_err(|_| unsupported(column, &raw))?)
        }
        (HostType::Bool, Value::Integer(i)) => Value::Boolean(*i != 0),
        (HostType::Bool, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Value::Boolean(true),
            "0" | "false" => Value::Boolean(false),
            _ => return Err(unsupported(column, &raw)),
        },
        (HostType::String, Value::Text(_)) => raw.clone(),
        (HostType::String, Value::Integer(i)) => Value::Text(i.to_string()),
        (HostType::String, Value::Real(r)) => Value::Text(r.to_string()),
        (HostType::Char, Value::Text(s)) if s.chars().count() == 1 => raw.clone(),
        (HostType::Bytes, Value::Blob(_)) => raw.clone(),
        (HostType::Bytes, Value::Text(s)) => Value::Blob(s.as_bytes().to_vec()),
        (HostType::DateTime, Value::Text(s)) => {
            Value::DateTime(parse_datetime(s).ok_or_else(|| unsupported(column, &raw))?)
        }
        (HostType::DateTime, Value::Integer(secs)) => Value::DateTime(
            DateTime::from_timestamp(*secs, 0)
                .ok_or_else(|| unsupported(column, &raw))?
                .naive_utc(),
        ),
        (HostType::Time, Value::Text(s)) => Value::Time(
            NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
                .map_err(|_| unsupported(column, &raw))?,
        ),
        (HostType::Guid, Value::Text(s)) => {
            Value::Guid(Uuid::parse_str(s.trim()).map_err(|_| unsupported(column, &raw))?)
        }
        (HostType::Guid, Value::Blob(b)) => {
            Value::Guid(Uuid::from_slice(b).map_err(|_| unsupported(column, &raw))?)
        }
        (HostType::Enum(ty), _) => {
            Value::Enum(ty.parse(&raw).ok_or_else(|| unsupported(column, &raw))?)
        }
        _ => return Err(unsupported(column, &raw)),
    };
    Ok(coerced)
}

/// Build a record from one cursor row.
pub fn materialize_record(
    table: &TableDescriptor,
    mapping: &[usize],
    row: Vec<Value>,
) -> Result<Record> {
    mapping
        .iter()
        .zip(row)
        .map(|(&index, raw)| {
            let column = &table.columns[index];
            coerce(column, raw).map(|value| (column.name.clone(), value))
        })
        .collect()
}

/// Lazily materialized result of a select.
///
/// The cursor was drained when the select ran; entities are built one at a
/// time as the iterator advances.
pub struct Rows<T> {
    table: Arc<TableDescriptor>,
    mapping: Vec<usize>,
    rows: std::vec::IntoIter<Vec<Value>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Rows<T> {
    pub(crate) fn new(
        table: Arc<TableDescriptor>,
        mapping: Vec<usize>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self {
            table,
            mapping,
            rows: rows.into_iter(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Iterator for Rows<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(materialize_record(&self.table, &self.mapping, row).and_then(T::from_record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl<T: Entity> ExactSizeIterator for Rows<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FieldSchema};
    use crate::types::EnumType;

    fn table() -> TableDescriptor {
        TableDescriptor::resolve(
            &EntitySchema::new("samples")
                .field(FieldSchema::of::<u8>("small"))
                .field(FieldSchema::of::<Option<f32>>("ratio"))
                .field(FieldSchema::of::<bool>("flag"))
                .field(FieldSchema::of::<NaiveDateTime>("at"))
                .field(FieldSchema::new(
                    "level",
                    HostType::Enum(EnumType::new("Level").variant("Low", 0).variant("High", 5)),
                )),
        )
        .unwrap()
    }

    #[test]
    fn maps_columns_case_insensitively_by_default() {
        let t = table();
        let names = vec!["SMALL".to_string(), "Flag".to_string()];
        assert_eq!(
            map_columns(&t, &names, ColumnMatching::CaseInsensitive).unwrap(),
            vec![0, 2]
        );
        assert!(matches!(
            map_columns(&t, &names, ColumnMatching::Exact),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn unmatched_cursor_column_is_an_error() {
        let t = table();
        let err = map_columns(&t, &["extra".to_string()], ColumnMatching::CaseInsensitive)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(name) if name == "samples.extra"));
    }

    #[test]
    fn narrows_and_widens_numbers() {
        let t = table();
        assert_eq!(coerce(&t.columns[0], Value::Integer(200)).unwrap(), Value::Integer(200));
        assert!(coerce(&t.columns[0], Value::Integer(300)).is_err());
        assert!(coerce(&t.columns[0], Value::Integer(-1)).is_err());
        assert_eq!(coerce(&t.columns[1], Value::Integer(2)).unwrap(), Value::Real(2.0));
        assert_eq!(coerce(&t.columns[1], Value::Null).unwrap(), Value::Null);
        assert_eq!(coerce(&t.columns[2], Value::Integer(1)).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn whole_reals_beyond_i64_are_out_of_range() {
        let wide = TableDescriptor::resolve(
            &EntitySchema::new("wide")
                .field(FieldSchema::of::<i64>("signed"))
                .field(FieldSchema::of::<u64>("unsigned")),
        )
        .unwrap();
        for column in &wide.columns {
            assert!(matches!(
                coerce(column, Value::Real(1e30)),
                Err(Error::Conversion { .. })
            ));
            assert!(coerce(column, Value::Real(-1e30)).is_err());
            assert!(coerce(column, Value::Real(9_223_372_036_854_775_808.0)).is_err());
            assert_eq!(coerce(column, Value::Real(42.0)).unwrap(), Value::Integer(42));
        }
        assert_eq!(
            coerce(&wide.columns[0], Value::Real(i64::MIN as f64)).unwrap(),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn invalid_utf8_text_is_not_rewritten() {
        let bytes = [b'o', b'k', 0xff, 0xfe];
        let raw = raw_value(ValueRef::Text(&bytes));
        assert_eq!(raw, Value::Blob(bytes.to_vec()));

        let text = TableDescriptor::resolve(
            &EntitySchema::new("texts")
                .field(FieldSchema::of::<String>("body"))
                .field(FieldSchema::of::<Vec<u8>>("payload")),
        )
        .unwrap();
        assert!(matches!(
            coerce(&text.columns[0], raw.clone()),
            Err(Error::Conversion { column, .. }) if column == "body"
        ));
        assert_eq!(coerce(&text.columns[1], raw).unwrap(), Value::Blob(bytes.to_vec()));
        assert_eq!(
            raw_value(ValueRef::Text("héllo".as_bytes())),
            Value::Text("héllo".into())
        );
    }

    #[test]
    fn parses_temporal_text() {
        let t = table();
        let value = coerce(&t.columns[3], Value::Text("2024-02-29 13:45:00.250".into())).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_milli_opt(13, 45, 0, 250)
            .unwrap();
        assert_eq!(value, Value::DateTime(expected));
        assert!(coerce(&t.columns[3], Value::Text("yesterday".into())).is_err());
    }

    #[test]
    fn enum_reads_either_representation() {
        let t = table();
        let by_int = coerce(&t.columns[4], Value::Integer(5)).unwrap();
        let by_name = coerce(&t.columns[4], Value::Text("High".into())).unwrap();
        assert_eq!(by_int, by_name);
        assert!(coerce(&t.columns[4], Value::Integer(3)).is_err());
    }

    #[test]
    fn blob_cannot_become_bool() {
        let t = table();
        assert!(matches!(
            coerce(&t.columns[2], Value::Blob(vec![1])),
            Err(Error::Conversion { .. })
        ));
    }
}
