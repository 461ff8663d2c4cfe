//! Type mapping between Rust host values and SQLite storage types.
//!
//! `HostType` describes what an entity field holds, `StorageType` is the
//! column type tag written into DDL. The mapping host → storage is total;
//! storage → host yields the canonical (widest) host type for the tag.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EnumStorage;
use crate::error::Error;

/// Text layout used for datetime columns.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
/// Text layout used for time columns.
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Column storage type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Integer,
    Real,
    Numeric,
    Boolean,
    Text,
    Blob,
    DateTime,
    Time,
    Guid,
}

impl StorageType {
    /// Type keyword used in `CREATE TABLE`.
    pub fn as_sql(self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
            StorageType::Numeric => "NUMERIC",
            StorageType::Boolean => "BOOLEAN",
            StorageType::Text => "TEXT",
            StorageType::Blob => "BLOB",
            StorageType::DateTime => "DATETIME",
            StorageType::Time => "TIME",
            StorageType::Guid => "GUID",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One named variant of a mapped enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    pub discriminant: i64,
}

/// Variant table of a mapped enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

impl EnumType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, name: impl Into<String>, discriminant: i64) -> Self {
        self.variants.push(EnumVariant {
            name: name.into(),
            discriminant,
        });
        self
    }

    pub fn by_discriminant(&self, discriminant: i64) -> Option<EnumValue> {
        self.variants
            .iter()
            .find(|v| v.discriminant == discriminant)
            .map(|v| EnumValue {
                name: v.name.clone(),
                discriminant: v.discriminant,
            })
    }

    pub fn by_name(&self, name: &str) -> Option<EnumValue> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .or_else(|| {
                self.variants
                    .iter()
                    .find(|v| v.name.eq_ignore_ascii_case(name))
            })
            .map(|v| EnumValue {
                name: v.name.clone(),
                discriminant: v.discriminant,
            })
    }

    /// Parse a stored value, whichever representation it was written with.
    ///
    /// Numeric parse is attempted before the name lookup.
    pub fn parse(&self, raw: &Value) -> Option<EnumValue> {
        match raw {
            Value::Integer(i) => self.by_discriminant(*i),
            Value::Text(s) => match s.trim().parse::<i64>() {
                Ok(i) => self.by_discriminant(i),
                Err(_) => self.by_name(s.trim()),
            },
            Value::Enum(e) => self.by_name(&e.name),
            _ => None,
        }
    }
}

/// Rust enums persisted through the mapper.
pub trait SqlEnum: Sized + Copy + 'static {
    fn enum_type() -> EnumType;
    fn discriminant(self) -> i64;
    fn from_discriminant(discriminant: i64) -> Option<Self>;
}

/// Host value kinds an entity field may hold.
///
/// In schema documents a host type is its name (`"i64"`,
/// `"option<datetime>"`), or for enums an object carrying the variant table:
/// `{"enum": {"name": .., "variants": [..]}, "nullable": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HostTypeDocument", into = "HostTypeDocument")]
pub enum HostType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    Bool,
    String,
    Char,
    Bytes,
    DateTime,
    Time,
    Guid,
    Enum(EnumType),
    Nullable(Box<HostType>),
}

impl HostType {
    pub fn nullable(inner: HostType) -> Self {
        match inner {
            HostType::Nullable(_) => inner,
            other => HostType::Nullable(Box::new(other)),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, HostType::Nullable(_))
    }

    /// The type with any nullable wrapper removed.
    pub fn unwrapped(&self) -> &HostType {
        match self {
            HostType::Nullable(inner) => inner.unwrapped(),
            other => other,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.unwrapped(),
            HostType::U8
                | HostType::U16
                | HostType::U32
                | HostType::U64
                | HostType::I8
                | HostType::I16
                | HostType::I32
                | HostType::I64
        )
    }

    /// Storage tag for this host type. Enums declare TEXT storage.
    pub fn storage_type(&self) -> StorageType {
        match self.unwrapped() {
            HostType::U8
            | HostType::U16
            | HostType::U32
            | HostType::U64
            | HostType::I8
            | HostType::I16
            | HostType::I32
            | HostType::I64 => StorageType::Integer,
            HostType::F32 | HostType::F64 => StorageType::Real,
            HostType::Decimal => StorageType::Numeric,
            HostType::Bool => StorageType::Boolean,
            HostType::String | HostType::Char | HostType::Enum(_) => StorageType::Text,
            HostType::Bytes => StorageType::Blob,
            HostType::DateTime => StorageType::DateTime,
            HostType::Time => StorageType::Time,
            HostType::Guid => StorageType::Guid,
            HostType::Nullable(_) => unreachable!("unwrapped() strips every nullable layer"),
        }
    }

    /// Canonical host type for a storage tag.
    pub fn from_storage(tag: StorageType) -> HostType {
        match tag {
            StorageType::Integer => HostType::I64,
            StorageType::Real => HostType::F64,
            StorageType::Numeric => HostType::Decimal,
            StorageType::Boolean => HostType::Bool,
            StorageType::Text => HostType::String,
            StorageType::Blob => HostType::Bytes,
            StorageType::DateTime => HostType::DateTime,
            StorageType::Time => HostType::Time,
            StorageType::Guid => HostType::Guid,
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostType::Enum(e) => write!(f, "enum {}", e.name),
            HostType::Nullable(inner) => write!(f, "option<{inner}>"),
            other => {
                let name = match other {
                    HostType::U8 => "u8",
                    HostType::U16 => "u16",
                    HostType::U32 => "u32",
                    HostType::U64 => "u64",
                    HostType::I8 => "i8",
                    HostType::I16 => "i16",
                    HostType::I32 => "i32",
                    HostType::I64 => "i64",
                    HostType::F32 => "f32",
                    HostType::F64 => "f64",
                    HostType::Decimal => "decimal",
                    HostType::Bool => "bool",
                    HostType::String => "string",
                    HostType::Char => "char",
                    HostType::Bytes => "bytes",
                    HostType::DateTime => "datetime",
                    HostType::Time => "time",
                    HostType::Guid => "guid",
                    HostType::Enum(_) | HostType::Nullable(_) => unreachable!(),
                };
                f.write_str(name)
            }
        }
    }
}

impl FromStr for HostType {
    type Err = Error;

    /// Parse a type name as written in schema documents. Enums cannot be
    /// named this way since they need their variant table.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if let Some(inner) = name
            .strip_prefix("option<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Ok(HostType::nullable(inner.parse()?));
        }
        let host = match name.as_str() {
            "u8" => HostType::U8,
            "u16" => HostType::U16,
            "u32" => HostType::U32,
            "u64" => HostType::U64,
            "i8" => HostType::I8,
            "i16" => HostType::I16,
            "i32" => HostType::I32,
            "i64" => HostType::I64,
            "f32" => HostType::F32,
            "f64" => HostType::F64,
            "decimal" => HostType::Decimal,
            "bool" => HostType::Bool,
            "string" => HostType::String,
            "char" => HostType::Char,
            "bytes" => HostType::Bytes,
            "datetime" => HostType::DateTime,
            "time" => HostType::Time,
            "guid" | "uuid" => HostType::Guid,
            _ => return Err(Error::NoMapping(s.to_string())),
        };
        Ok(host)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum HostTypeDocument {
    Name(String),
    Enum {
        #[serde(rename = "enum")]
        enum_type: EnumType,
        #[serde(default)]
        nullable: bool,
    },
}

impl TryFrom<HostTypeDocument> for HostType {
    type Error = Error;

    fn try_from(document: HostTypeDocument) -> Result<Self, Error> {
        match document {
            HostTypeDocument::Name(name) => name.parse(),
            HostTypeDocument::Enum { enum_type, nullable } => {
                let host = HostType::Enum(enum_type);
                Ok(if nullable { HostType::nullable(host) } else { host })
            }
        }
    }
}

impl From<HostType> for HostTypeDocument {
    fn from(host: HostType) -> Self {
        match host {
            HostType::Enum(enum_type) => HostTypeDocument::Enum {
                enum_type,
                nullable: false,
            },
            HostType::Nullable(inner) => match *inner {
                HostType::Enum(enum_type) => HostTypeDocument::Enum {
                    enum_type,
                    nullable: true,
                },
                other => HostTypeDocument::Name(HostType::nullable(other).to_string()),
            },
            other => HostTypeDocument::Name(other.to_string()),
        }
    }
}

/// Rust types with a fixed host type.
pub trait Mapped {
    fn host_type() -> HostType;
}

macro_rules! mapped {
    ($($ty:ty => $host:expr),* $(,)?) => {
        $(impl Mapped for $ty {
            fn host_type() -> HostType {
                $host
            }
        })*
    };
}

mapped! {
    u8 => HostType::U8,
    u16 => HostType::U16,
    u32 => HostType::U32,
    u64 => HostType::U64,
    i8 => HostType::I8,
    i16 => HostType::I16,
    i32 => HostType::I32,
    i64 => HostType::I64,
    f32 => HostType::F32,
    f64 => HostType::F64,
    bool => HostType::Bool,
    String => HostType::String,
    char => HostType::Char,
    Vec<u8> => HostType::Bytes,
    NaiveDateTime => HostType::DateTime,
    NaiveTime => HostType::Time,
    Uuid => HostType::Guid,
}

impl<T: Mapped> Mapped for Option<T> {
    fn host_type() -> HostType {
        HostType::nullable(T::host_type())
    }
}

/// Resolved enum value: variant name plus discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub discriminant: i64,
}

impl EnumValue {
    pub fn to_enum<E: SqlEnum>(&self) -> Option<E> {
        E::from_discriminant(self.discriminant)
    }
}

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Guid(Uuid),
    Enum(EnumValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn from_enum<E: SqlEnum>(value: E) -> Self {
        let discriminant = value.discriminant();
        match E::enum_type().by_discriminant(discriminant) {
            Some(resolved) => Value::Enum(resolved),
            None => Value::Integer(discriminant),
        }
    }

    /// Lower an enum to the representation selected for writes.
    pub fn for_storage(self, storage: EnumStorage) -> Self {
        match (self, storage) {
            (Value::Enum(e), EnumStorage::Text) => Value::Text(e.name),
            (Value::Enum(e), EnumStorage::Integer) => Value::Integer(e.discriminant),
            (other, _) => other,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(i64::from(*b)),
            Value::Enum(e) => Some(e.discriminant),
            _ => None,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Real(r) => SqlValue::Real(*r),
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Blob(b) => SqlValue::Blob(b.clone()),
            Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
            Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
            Value::Time(t) => SqlValue::Text(t.format(TIME_FORMAT).to_string()),
            Value::Guid(g) => SqlValue::Text(g.hyphenated().to_string()),
            Value::Enum(e) => SqlValue::Text(e.name.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Integer(i64::from(v))
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

/// Stored bit-for-bit as a signed 64-bit integer.
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion out of a materialized value.
///
/// Values reaching this trait were already coerced to the column's host
/// type, so the impls only unwrap the matching variant.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch<T>(expected: &str, got: &Value) -> Result<T, String> {
    Err(format!("expected {expected}, found {got:?}"))
}

macro_rules! int_from_value {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::Integer(i) => <$ty>::try_from(i)
                        .map_err(|_| format!("{i} out of range for {}", stringify!($ty))),
                    other => mismatch(stringify!($ty), &other),
                }
            }
        })*
    };
}

int_from_value!(i8, i16, i32, i64, u8, u16, u32);

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Integer(i) => Ok(i as u64),
            other => mismatch("u64", &other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Real(r) => Ok(r),
            Value::Integer(i) => Ok(i as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, String> {
        f64::from_value(value).map(|r| r as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Boolean(b) => Ok(b),
            Value::Integer(i) => Ok(i != 0),
            other => mismatch("bool", &other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Enum(e) => Ok(e.name),
            other => mismatch("text", &other),
        }
    }
}

impl FromValue for char {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(format!("expected a single character, found {s:?}")),
                }
            }
            other => mismatch("char", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Blob(b) => Ok(b),
            other => mismatch("blob", &other),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => mismatch("datetime", &other),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Time(t) => Ok(t),
            other => mismatch("time", &other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Guid(g) => Ok(g),
            other => mismatch("guid", &other),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
