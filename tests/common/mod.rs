// Shared entities for the integration tests.
#![allow(dead_code)]

use chrono::{NaiveDateTime, NaiveTime};
use rust_sqlite_orm::{
    Entity, EntitySchema, EnumType, Error, FieldSchema, HostType, Record, Result, SqlEnum, Value,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active = 1,
    Suspended = 2,
    Closed = 3,
}

impl SqlEnum for Status {
    fn enum_type() -> EnumType {
        EnumType::new("Status")
            .variant("Active", 1)
            .variant("Suspended", 2)
            .variant("Closed", 3)
    }

    fn discriminant(self) -> i64 {
        self as i64
    }

    fn from_discriminant(discriminant: i64) -> Option<Self> {
        match discriminant {
            1 => Some(Status::Active),
            2 => Some(Status::Suspended),
            3 => Some(Status::Closed),
            _ => None,
        }
    }
}

fn set_id(target: &mut Option<i64>, column: &str, value: Value) -> Result<()> {
    match value {
        Value::Integer(id) => {
            *target = Some(id);
            Ok(())
        }
        other => Err(Error::Conversion {
            column: column.to_string(),
            message: format!("expected integer id, got {other:?}"),
        }),
    }
}

/// AUTOINCREMENT table: bulk insert path.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    pub age: Option<i32>,
    pub status: Status,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            age: None,
            status: Status::Active,
        }
    }
}

impl Entity for User {
    fn schema() -> EntitySchema {
        EntitySchema::new("users")
            .field(FieldSchema::of::<Option<i64>>("id").autoincrement())
            .field(FieldSchema::of::<String>("name").not_null())
            .field(FieldSchema::of::<String>("email").unique().not_null())
            .field(FieldSchema::of::<Option<i32>>("age"))
            .field(FieldSchema::enumeration::<Status>("status").not_null())
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("email", self.email.as_str())
            .with("age", self.age)
            .with("status", Value::from_enum(self.status))
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("id")?,
            name: record.take("name")?,
            email: record.take("email")?,
            age: record.take("age")?,
            status: record.take_enum("status")?,
        })
    }

    fn set_value(&mut self, column: &str, value: Value) -> Result<()> {
        set_id(&mut self.id, column, value)
    }
}

/// Plain INTEGER PRIMARY KEY table referencing users: per-row insert path.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: Option<i64>,
    pub user_id: i64,
    pub body: String,
}

impl Note {
    pub fn new(user_id: i64, body: &str) -> Self {
        Self {
            id: None,
            user_id,
            body: body.to_string(),
        }
    }
}

impl Entity for Note {
    fn schema() -> EntitySchema {
        EntitySchema::new("notes")
            .field(FieldSchema::of::<Option<i64>>("id").primary_key())
            .field(FieldSchema::of::<i64>("user_id").not_null().references(User::schema()))
            .field(FieldSchema::of::<String>("body"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("user_id", self.user_id)
            .with("body", self.body.as_str())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("id")?,
            user_id: record.take("user_id")?,
            body: record.take("body")?,
        })
    }

    fn set_value(&mut self, column: &str, value: Value) -> Result<()> {
        set_id(&mut self.id, column, value)
    }
}

/// Composite primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub group_id: i64,
    pub user_id: i64,
    pub role: String,
}

impl Entity for Membership {
    fn schema() -> EntitySchema {
        EntitySchema::new("memberships")
            .field(FieldSchema::of::<i64>("group_id").primary_key())
            .field(FieldSchema::of::<i64>("user_id").primary_key())
            .field(FieldSchema::of::<String>("role"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("group_id", self.group_id)
            .with("user_id", self.user_id)
            .with("role", self.role.as_str())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            group_id: record.take("group_id")?,
            user_id: record.take("user_id")?,
            role: record.take("role")?,
        })
    }
}

/// Integer key without a generated-value hook.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: Option<i64>,
    pub label: String,
}

impl Entity for Tag {
    fn schema() -> EntitySchema {
        EntitySchema::new("tags")
            .field(FieldSchema::of::<Option<i64>>("id").primary_key())
            .field(FieldSchema::of::<String>("label"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("label", self.label.as_str())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("id")?,
            label: record.take("label")?,
        })
    }
}

/// No primary key at all.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub level: String,
    pub line: Option<String>,
}

impl Entity for LogLine {
    fn schema() -> EntitySchema {
        EntitySchema::new("log_lines")
            .field(FieldSchema::of::<String>("level"))
            .field(FieldSchema::of::<Option<String>>("line"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("level", self.level.as_str())
            .with("line", self.line.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            level: record.take("level")?,
            line: record.take("line")?,
        })
    }
}

/// WITHOUT ROWID table keyed by text.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Entity for Setting {
    fn schema() -> EntitySchema {
        EntitySchema::new("settings")
            .field(FieldSchema::of::<String>("key").primary_key())
            .field(FieldSchema::of::<String>("value"))
            .without_rowid()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("key", self.key.as_str())
            .with("value", self.value.as_str())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            key: record.take("key")?,
            value: record.take("value")?,
        })
    }
}

/// One field of every supported host type.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: Option<i64>,
    pub tiny: u8,
    pub small: i16,
    pub wide: u64,
    pub ratio: f32,
    pub amount: f64,
    pub flag: bool,
    pub label: String,
    pub initial: char,
    pub payload: Vec<u8>,
    pub at: NaiveDateTime,
    pub alarm: NaiveTime,
    pub token: Uuid,
    pub maybe: Option<i64>,
    pub status: Status,
    pub previous: Option<Status>,
    /// Relation member, never stored.
    pub notes: Vec<String>,
}

impl Entity for Sample {
    fn schema() -> EntitySchema {
        EntitySchema::new("samples")
            .field(FieldSchema::of::<Option<i64>>("id").autoincrement())
            .field(FieldSchema::of::<u8>("tiny"))
            .field(FieldSchema::of::<i16>("small"))
            .field(FieldSchema::of::<u64>("wide"))
            .field(FieldSchema::of::<f32>("ratio"))
            .field(FieldSchema::new("amount", HostType::Decimal))
            .field(FieldSchema::of::<bool>("flag"))
            .field(FieldSchema::of::<String>("label"))
            .field(FieldSchema::of::<char>("initial"))
            .field(FieldSchema::of::<Vec<u8>>("payload"))
            .field(FieldSchema::of::<NaiveDateTime>("at"))
            .field(FieldSchema::of::<NaiveTime>("alarm"))
            .field(FieldSchema::of::<Uuid>("token"))
            .field(FieldSchema::of::<Option<i64>>("maybe"))
            .field(FieldSchema::enumeration::<Status>("status"))
            .field(FieldSchema::nullable_enumeration::<Status>("previous"))
            .field(FieldSchema::of::<Option<String>>("notes").not_persisted())
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("tiny", self.tiny)
            .with("small", self.small)
            .with("wide", self.wide)
            .with("ratio", self.ratio)
            .with("amount", self.amount)
            .with("flag", self.flag)
            .with("label", self.label.as_str())
            .with("initial", self.initial)
            .with("payload", self.payload.clone())
            .with("at", self.at)
            .with("alarm", self.alarm)
            .with("token", self.token)
            .with("maybe", self.maybe)
            .with("status", Value::from_enum(self.status))
            .with("previous", self.previous.map(Value::from_enum))
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("id")?,
            tiny: record.take("tiny")?,
            small: record.take("small")?,
            wide: record.take("wide")?,
            ratio: record.take("ratio")?,
            amount: record.take("amount")?,
            flag: record.take("flag")?,
            label: record.take("label")?,
            initial: record.take("initial")?,
            payload: record.take("payload")?,
            at: record.take("at")?,
            alarm: record.take("alarm")?,
            token: record.take("token")?,
            maybe: record.take("maybe")?,
            status: record.take_enum("status")?,
            previous: record.take_optional_enum("previous")?,
            notes: Vec::new(),
        })
    }

    fn set_value(&mut self, column: &str, value: Value) -> Result<()> {
        set_id(&mut self.id, column, value)
    }
}

pub fn users(n: usize) -> Vec<User> {
    (0..n).map(|i| User::new(&format!("user {i}"))).collect()
}

pub fn ids<T, F: Fn(&T) -> Option<i64>>(items: &[T], id: F) -> Vec<Option<i64>> {
    items.iter().map(id).collect()
}
