//! The contract between persisted Rust types and the engine.

use crate::error::{Error, Result};
use crate::schema::EntitySchema;
use crate::types::{FromValue, SqlEnum, Value};

/// A Rust type persisted as one table row.
///
/// Implementors describe their columns through [`Entity::schema`] and move
/// their field values in and out of [`Record`]s keyed by column name.
pub trait Entity: Sized + 'static {
    fn schema() -> EntitySchema;

    fn to_record(&self) -> Record;

    fn from_record(record: Record) -> Result<Self>;

    /// Write a generated value back into the field backing `column`.
    ///
    /// Called with the rowid alias after an insert has committed. Types that
    /// do not track generated identifiers keep this default, which ignores
    /// the value.
    fn set_value(&mut self, column: &str, value: Value) -> Result<()> {
        let _ = (column, value);
        Ok(())
    }
}

/// Ordered column-name → value map for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Insert or replace the value of `column`.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.position(&column) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((column, value)),
        }
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(name, _)| name == column)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|(name, _)| name.eq_ignore_ascii_case(column))
            })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|i| &self.entries[i].1)
    }

    /// Value of `column`, treating a missing entry as null.
    pub fn value_or_null(&self, column: &str) -> Value {
        self.get(column).cloned().unwrap_or(Value::Null)
    }

    /// Remove `column` and convert it to `T`.
    pub fn take<T: FromValue>(&mut self, column: &str) -> Result<T> {
        let value = self.remove(column)?;
        T::from_value(value).map_err(|message| Error::conversion(column, message))
    }

    pub fn take_enum<E: SqlEnum>(&mut self, column: &str) -> Result<E> {
        match self.take_optional_enum(column)? {
            Some(e) => Ok(e),
            None => Err(Error::conversion(column, "unexpected null")),
        }
    }

    pub fn take_optional_enum<E: SqlEnum>(&mut self, column: &str) -> Result<Option<E>> {
        let value = self.remove(column)?;
        if value.is_null() {
            return Ok(None);
        }
        E::enum_type()
            .parse(&value)
            .and_then(|parsed| parsed.to_enum::<E>())
            .map(Some)
            .ok_or_else(|| Error::conversion(column, format!("{value:?} is not a variant")))
    }

    fn remove(&mut self, column: &str) -> Result<Value> {
        match self.position(column) {
            Some(i) => Ok(self.entries.remove(i).1),
            None => Err(Error::UnknownColumn(column.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.push(column, value);
        }
        record
    }
}
