//! Object-relational mapping over SQLite for the Runar ecosystem.
//!
//! # Intention
//!
//! - Map declaratively described Rust types onto SQLite tables.
//! - Generate schema and CRUD statements with named parameter binding.
//! - Assign generated row identifiers back into inserted values.
//! - Materialize result cursors into typed values.
//!
//! # Architectural Boundaries
//!
//! - SQLite itself is reached only through `rusqlite`.
//! - Schema metadata arrives as an [`EntitySchema`]; nothing here inspects
//!   Rust types at runtime.
//! - No query planning, joins, pooling, migrations or caching.

pub mod config;
pub mod entity;
pub mod error;
pub mod insert;
pub mod intercept;
pub mod materialize;
pub mod query;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use config::{ColumnMatching, DatabaseConfig, EnumStorage, IdAssignment};
pub use entity::{Entity, Record};
pub use error::{Error, Result};
pub use insert::NO_ROWID;
pub use intercept::{EventTarget, Interceptor, OperationKind, QueryEvent, Verdict};
pub use materialize::Rows;
pub use query::{Params, QueryBuilder, SqlQuery};
pub use schema::{ColumnDescriptor, EntitySchema, FieldSchema, TableDescriptor};
pub use sqlite::Database;
pub use types::{EnumType, FromValue, HostType, Mapped, SqlEnum, StorageType, Value};
