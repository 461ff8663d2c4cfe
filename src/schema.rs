//! Schema descriptors and their resolution into table descriptors.
//!
//! An [`EntitySchema`] is the declarative description of a persisted type,
//! written with the builder API or loaded from a configuration document.
//! [`TableDescriptor::resolve`] validates it and derives the facts the query
//! builder needs: column storage types, constraints, the rowid alias.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ColumnMatching;
use crate::error::{Error, Result};
use crate::query::quote_ident;
use crate::types::{HostType, Mapped, SqlEnum, StorageType};

/// Declared metadata for one field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub host_type: HostType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub autoincrement: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub not_null: bool,
    /// Entity whose primary key this field references.
    #[serde(default)]
    pub references: Option<Box<EntitySchema>>,
    /// Relation or navigation members that are not columns.
    #[serde(default)]
    pub not_persisted: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, host_type: HostType) -> Self {
        Self {
            name: name.into(),
            host_type,
            primary_key: false,
            autoincrement: false,
            unique: false,
            not_null: false,
            references: None,
            not_persisted: false,
        }
    }

    /// Field holding the Rust type `T`.
    pub fn of<T: Mapped>(name: impl Into<String>) -> Self {
        Self::new(name, T::host_type())
    }

    pub fn enumeration<E: SqlEnum>(name: impl Into<String>) -> Self {
        Self::new(name, HostType::Enum(E::enum_type()))
    }

    pub fn nullable_enumeration<E: SqlEnum>(name: impl Into<String>) -> Self {
        Self::new(name, HostType::nullable(HostType::Enum(E::enum_type())))
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Autoincrement implies primary key.
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn references(mut self, target: EntitySchema) -> Self {
        self.references = Some(Box::new(target));
        self
    }

    pub fn not_persisted(mut self) -> Self {
        self.not_persisted = true;
        self
    }
}

/// Declared metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub table: String,
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub without_rowid: bool,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            without_rowid: false,
        }
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn without_rowid(mut self) -> Self {
        self.without_rowid = true;
        self
    }

    /// Parse a schema document.
    ///
    /// Field types are type names such as `"i64"` or `"option<datetime>"`;
    /// a name with no host type mapping is an [`Error::NoMapping`].
    pub fn from_json(document: &str) -> Result<Self> {
        let document: serde_json::Value =
            serde_json::from_str(document).map_err(|e| Error::Config(e.to_string()))?;
        check_type_names(&document)?;
        serde_json::from_value(document).map_err(|e| Error::Config(e.to_string()))
    }
}

fn check_type_names(schema: &serde_json::Value) -> Result<()> {
    let fields = schema.get("fields").and_then(serde_json::Value::as_array);
    for field in fields.into_iter().flatten() {
        if let Some(name) = field.get("type").and_then(serde_json::Value::as_str) {
            name.parse::<HostType>()?;
        }
        if let Some(target) = field.get("references") {
            check_type_names(target)?;
        }
    }
    Ok(())
}

/// Resolved foreign-key target.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub table: Arc<TableDescriptor>,
    pub column: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub primary: bool,
    pub autoincrement: bool,
    pub unique: bool,
    pub not_null: bool,
    pub foreign_key: Option<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub host_type: HostType,
    pub storage_type: StorageType,
    pub constraints: Constraints,
}

impl ColumnDescriptor {
    pub fn is_primary(&self) -> bool {
        self.constraints.primary
    }

    pub fn is_nullable(&self) -> bool {
        self.host_type.is_nullable()
    }
}

/// Resolved, immutable schema facts for an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub without_rowid: bool,
    rowid_alias: Option<usize>,
}

impl TableDescriptor {
    pub fn resolve(schema: &EntitySchema) -> Result<Self> {
        let mut columns: Vec<ColumnDescriptor> = Vec::with_capacity(schema.fields.len());
        for field in schema.fields.iter().filter(|f| !f.not_persisted) {
            if columns
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(Error::usage(format!(
                    "column `{}` declared twice on `{}`",
                    field.name, schema.table
                )));
            }
            let foreign_key = match &field.references {
                Some(target) => Some(Self::resolve_reference(target)?),
                None => None,
            };
            columns.push(ColumnDescriptor {
                name: field.name.clone(),
                storage_type: field.host_type.storage_type(),
                host_type: field.host_type.clone(),
                constraints: Constraints {
                    primary: field.primary_key || field.autoincrement,
                    autoincrement: field.autoincrement,
                    unique: field.unique,
                    not_null: field.not_null,
                    foreign_key,
                },
            });
        }
        if columns.is_empty() {
            return Err(Error::usage(format!(
                "`{}` declares no persisted columns",
                schema.table
            )));
        }

        let autoincrement: Vec<&ColumnDescriptor> = columns
            .iter()
            .filter(|c| c.constraints.autoincrement)
            .collect();
        let primary_count = columns.iter().filter(|c| c.is_primary()).count();
        if autoincrement.len() > 1 {
            return Err(Error::usage(format!(
                "`{}` declares more than one autoincrement column",
                schema.table
            )));
        }
        if let Some(column) = autoincrement.first() {
            if primary_count > 1 || !column.host_type.is_integer() {
                return Err(Error::usage(format!(
                    "autoincrement column `{}` must be the only, integer, primary key",
                    column.name
                )));
            }
        }

        let rowid_alias = if schema.without_rowid || primary_count != 1 {
            None
        } else {
            columns
                .iter()
                .position(|c| c.is_primary() && c.storage_type == StorageType::Integer)
        };

        Ok(Self {
            name: schema.table.clone(),
            columns,
            without_rowid: schema.without_rowid,
            rowid_alias,
        })
    }

    fn resolve_reference(target: &EntitySchema) -> Result<ForeignKey> {
        let table = TableDescriptor::resolve(target)?;
        let primary = table.primary_columns();
        if primary.len() != 1 {
            return Err(Error::NotImplemented(format!(
                "foreign key to `{}` which has {} primary key columns",
                table.name,
                primary.len()
            )));
        }
        let column = primary[0].name.clone();
        Ok(ForeignKey {
            table: Arc::new(table),
            column,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.find_column(name, ColumnMatching::Exact)
            .map(|i| &self.columns[i])
    }

    /// Index of the column called `name` under the given matching rule.
    pub fn find_column(&self, name: &str, matching: ColumnMatching) -> Option<usize> {
        match matching {
            ColumnMatching::Exact => self.columns.iter().position(|c| c.name == name),
            ColumnMatching::CaseInsensitive => self
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name)),
        }
    }

    pub fn primary_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_primary()).collect()
    }

    pub fn rowid_alias(&self) -> Option<&ColumnDescriptor> {
        self.rowid_alias.map(|i| &self.columns[i])
    }

    pub fn autoincrement_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.constraints.autoincrement)
    }

    /// Tables referenced by foreign keys, in column order.
    pub fn referenced_tables(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter_map(|c| c.constraints.foreign_key.as_ref())
            .map(|fk| fk.table.name.as_str())
            .collect()
    }

    /// `CREATE TABLE` statement for this table.
    pub fn create_sql(&self) -> String {
        let composite = self.primary_columns().len() > 1;
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", quote_ident(&c.name), c.storage_type.as_sql());
                if c.constraints.primary && !composite {
                    def.push_str(" PRIMARY KEY");
                }
                if c.constraints.autoincrement {
                    def.push_str(" AUTOINCREMENT");
                }
                if c.constraints.unique {
                    def.push_str(" UNIQUE");
                }
                if c.constraints.not_null {
                    def.push_str(" NOT NULL");
                }
                if let Some(fk) = &c.constraints.foreign_key {
                    def.push_str(&format!(
                        " REFERENCES {}({})",
                        quote_ident(&fk.table.name),
                        quote_ident(&fk.column)
                    ));
                }
                def
            })
            .collect();
        if composite {
            let keys: Vec<String> = self
                .primary_columns()
                .iter()
                .map(|c| quote_ident(&c.name))
                .collect();
            defs.push(format!("PRIMARY KEY({})", keys.join(", ")));
        }
        let mut sql = format!("CREATE TABLE {} ({})", quote_ident(&self.name), defs.join(", "));
        if self.without_rowid {
            sql.push_str(" WITHOUT ROWID");
        }
        sql
    }
}
