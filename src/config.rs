//! Database configuration.
//!
//! Every knob has a default, so an empty JSON object is a valid document.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How enum values are written by insert and update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumStorage {
    /// Variant name as TEXT.
    #[default]
    Text,
    /// Discriminant as INTEGER.
    Integer,
}

/// How cursor column names are matched against descriptor columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMatching {
    #[default]
    CaseInsensitive,
    Exact,
}

/// Identifier assignment strategy for inserts into tables with an
/// AUTOINCREMENT column. Every other table always inserts row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdAssignment {
    /// One multi-row INSERT, identifiers computed from the generator counter.
    #[default]
    Bulk,
    /// One INSERT per row, identifiers read back after each.
    PerRow,
}

/// SQLite ORM configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. `None` opens an in-memory database.
    pub db_path: Option<String>,
    pub enum_storage: EnumStorage,
    pub column_matching: ColumnMatching,
    pub id_assignment: IdAssignment,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u64>,
    /// Run `PRAGMA foreign_keys = ON` after opening.
    pub foreign_keys: bool,
}

impl DatabaseConfig {
    /// Create a new config for the database file at `db_path`
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: Some(db_path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document.
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_enum_storage(mut self, storage: EnumStorage) -> Self {
        self.enum_storage = storage;
        self
    }

    pub fn with_column_matching(mut self, matching: ColumnMatching) -> Self {
        self.column_matching = matching;
        self
    }

    pub fn with_id_assignment(mut self, assignment: IdAssignment) -> Self {
        self.id_assignment = assignment;
        self
    }

    pub fn with_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = DatabaseConfig::from_json("{}").unwrap();
        assert_eq!(config, DatabaseConfig::default());
        assert_eq!(config.enum_storage, EnumStorage::Text);
        assert_eq!(config.column_matching, ColumnMatching::CaseInsensitive);
        assert_eq!(config.id_assignment, IdAssignment::Bulk);
    }

    #[test]
    fn parses_snake_case_variants() {
        let config = DatabaseConfig::from_json(
            r#"{"db_path": "app.db", "enum_storage": "integer",
                "column_matching": "exact", "id_assignment": "per_row",
                "busy_timeout_ms": 250, "foreign_keys": true}"#,
        )
        .unwrap();
        assert_eq!(config.db_path.as_deref(), Some("app.db"));
        assert_eq!(config.enum_storage, EnumStorage::Integer);
        assert_eq!(config.column_matching, ColumnMatching::Exact);
        assert_eq!(config.id_assignment, IdAssignment::PerRow);
        assert_eq!(config.busy_timeout_ms, Some(250));
        assert!(config.foreign_keys);
    }

    #[test]
    fn rejects_unknown_variant() {
        let err = DatabaseConfig::from_json(r#"{"enum_storage": "binary"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
