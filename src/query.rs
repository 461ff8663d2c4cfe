//! SQL text generation and parameter binding.
//!
//! Every builder returns [`SqlQuery`] values: statement text with `@name`
//! placeholders plus the values to bind. Null values never become
//! parameters; they are written into the text as `NULL`.

use std::collections::HashMap;

use crate::config::EnumStorage;
use crate::entity::{Entity, Record};
use crate::error::{Error, Result};
use crate::schema::{ColumnDescriptor, TableDescriptor};
use crate::types::Value;

/// Placeholder marker used in statements and condition templates.
pub const PLACEHOLDER: char = '@';

/// Upper bound on parameters bound to a single statement.
pub const MAX_BOUND_PARAMETERS: usize = 32_766;

/// Parameter bindings for SQL queries
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: HashMap<String, Value>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let name = name.strip_prefix(PLACEHOLDER).unwrap_or(name);
        self.values.insert(name.to_string(), value.into());
    }

    /// Bind every field of `item` under its column name.
    pub fn from_entity<E: Entity>(item: &E) -> Self {
        Self::from(&item.to_record())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<&Record> for Params {
    fn from(record: &Record) -> Self {
        let mut params = Params::new();
        for (column, value) in record.iter() {
            params.insert(column, value.clone());
        }
        params
    }
}

/// SQL Query with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Double-quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace `@name` placeholders whose bound value is null with `NULL`.
///
/// Quoted literals and identifiers are left untouched.
pub fn inline_null_placeholders(condition: &str, params: &Params) -> String {
    let mut out = String::with_capacity(condition.len());
    let mut chars = condition.char_indices().peekable();
    let mut quote: Option<char> = None;
    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            PLACEHOLDER => {
                let start = i + c.len_utf8();
                let mut end = start;
                while let Some(&(j, n)) = chars.peek() {
                    if !is_ident_char(n) {
                        break;
                    }
                    end = j + n.len_utf8();
                    chars.next();
                }
                let name = &condition[start..end];
                match params.get(name) {
                    Some(value) if value.is_null() => out.push_str("NULL"),
                    _ => {
                        out.push(PLACEHOLDER);
                        out.push_str(name);
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Builds statements for one table.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    table: &'a TableDescriptor,
    enum_storage: EnumStorage,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(table: &'a TableDescriptor, enum_storage: EnumStorage) -> Self {
        Self {
            table,
            enum_storage,
        }
    }

    fn table_name(&self) -> String {
        quote_ident(&self.table.name)
    }

    /// Render `value` either as literal `NULL` or as a new placeholder.
    fn bind(&self, params: &mut Params, name: String, value: Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        let placeholder = format!("{PLACEHOLDER}{name}");
        params
            .values
            .insert(name, value.for_storage(self.enum_storage));
        placeholder
    }

    fn conditioned(
        &self,
        head: String,
        condition: Option<&str>,
        params: Option<&Params>,
    ) -> Result<SqlQuery> {
        let condition = match condition {
            None => "1".to_string(),
            Some(c) if c.trim().is_empty() => {
                return Err(Error::usage(format!(
                    "empty condition for `{}`",
                    self.table.name
                )))
            }
            Some(c) => c.to_string(),
        };
        let mut bound = Params::new();
        let condition = match params {
            Some(params) => {
                for (name, value) in params.iter().filter(|(_, v)| !v.is_null()) {
                    bound
                        .values
                        .insert(name.to_string(), value.clone().for_storage(self.enum_storage));
                }
                inline_null_placeholders(&condition, params)
            }
            None => condition,
        };
        Ok(SqlQuery {
            statement: format!("{head} WHERE {condition}"),
            params: bound,
        })
    }

    pub fn create_table(&self) -> SqlQuery {
        SqlQuery::new(&self.table.create_sql())
    }

    pub fn drop_table(&self) -> SqlQuery {
        SqlQuery::new(&format!("DROP TABLE IF EXISTS {}", self.table_name()))
    }

    /// `SELECT *`; a `None` condition selects every row.
    pub fn select(&self, condition: Option<&str>, params: Option<&Params>) -> Result<SqlQuery> {
        self.conditioned(format!("SELECT * FROM {}", self.table_name()), condition, params)
    }

    pub fn count(&self, condition: Option<&str>, params: Option<&Params>) -> Result<SqlQuery> {
        self.conditioned(
            format!("SELECT COUNT(*) FROM {}", self.table_name()),
            condition,
            params,
        )
    }

    pub fn delete_where(&self, condition: &str, params: Option<&Params>) -> Result<SqlQuery> {
        self.conditioned(
            format!("DELETE FROM {}", self.table_name()),
            Some(condition),
            params,
        )
    }

    fn column_list(&self) -> String {
        self.table
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn values_tuple(&self, params: &mut Params, row: usize, record: &Record) -> String {
        let cells: Vec<String> = self
            .table
            .columns
            .iter()
            .enumerate()
            .map(|(j, c)| self.bind(params, format!("i{row}_{j}"), record.value_or_null(&c.name)))
            .collect();
        format!("({})", cells.join(", "))
    }

    /// Single-row `INSERT`.
    pub fn insert(&self, record: &Record) -> SqlQuery {
        let mut params = Params::new();
        let tuple = self.values_tuple(&mut params, 0, record);
        SqlQuery {
            statement: format!(
                "INSERT INTO {} ({}) VALUES {tuple}",
                self.table_name(),
                self.column_list()
            ),
            params,
        }
    }

    /// Multi-row `INSERT`s covering `records` in order, split so that no
    /// statement exceeds [`MAX_BOUND_PARAMETERS`].
    pub fn insert_many(&self, records: &[Record]) -> Vec<SqlQuery> {
        let rows_per_statement = (MAX_BOUND_PARAMETERS / self.table.columns.len()).max(1);
        records
            .chunks(rows_per_statement)
            .map(|chunk| {
                let mut params = Params::new();
                let tuples: Vec<String> = chunk
                    .iter()
                    .enumerate()
                    .map(|(i, record)| self.values_tuple(&mut params, i, record))
                    .collect();
                SqlQuery {
                    statement: format!(
                        "INSERT INTO {} ({}) VALUES {}",
                        self.table_name(),
                        self.column_list(),
                        tuples.join(", ")
                    ),
                    params,
                }
            })
            .collect()
    }

    /// One `UPDATE` per record keyed on the primary columns. Placeholder
    /// names are unique across the whole batch.
    pub fn update(&self, records: &[Record]) -> Result<Vec<SqlQuery>> {
        if self.table.primary_columns().is_empty() {
            return Err(Error::usage(format!(
                "cannot update `{}`: no primary key",
                self.table.name
            )));
        }
        if self.table.columns.iter().all(|c| c.is_primary()) {
            return Err(Error::usage(format!(
                "cannot update `{}`: every column is part of the primary key",
                self.table.name
            )));
        }
        let mut statements = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let mut params = Params::new();
            let mut sets = Vec::new();
            let mut keys = Vec::new();
            for (j, column) in self.table.columns.iter().enumerate() {
                let value = record.value_or_null(&column.name);
                let ident = quote_ident(&column.name);
                if column.is_primary() {
                    if value.is_null() {
                        keys.push(format!("{ident} IS NULL"));
                    } else {
                        let placeholder = self.bind(&mut params, format!("k{i}_{j}"), value);
                        keys.push(format!("{ident} = {placeholder}"));
                    }
                } else {
                    let placeholder = self.bind(&mut params, format!("u{i}_{j}"), value);
                    sets.push(format!("{ident} = {placeholder}"));
                }
            }
            statements.push(SqlQuery {
                statement: format!(
                    "UPDATE {} SET {} WHERE {}",
                    self.table_name(),
                    sets.join(", "),
                    keys.join(" AND ")
                ),
                params,
            });
        }
        Ok(statements)
    }

    /// One set-oriented `DELETE` matching the key values of `records`.
    ///
    /// Keys are the primary columns, or every column when there are none. A
    /// single key column becomes an OR-list over its distinct values; wider
    /// keys become an OR over the distinct key tuples. Returns `None` for an
    /// empty collection.
    pub fn delete_records(&self, records: &[Record]) -> Option<SqlQuery> {
        if records.is_empty() {
            return None;
        }
        let primary = self.table.primary_columns();
        let keys: Vec<_> = if primary.is_empty() {
            self.table.columns.iter().collect()
        } else {
            primary
        };
        let mut tuples: Vec<Vec<Value>> = Vec::new();
        for record in records {
            let tuple: Vec<Value> = keys
                .iter()
                .map(|column| record.value_or_null(&column.name))
                .collect();
            if !tuples.contains(&tuple) {
                tuples.push(tuple);
            }
        }
        let mut params = Params::new();
        let condition = if keys.len() == 1 {
            let alternatives: Vec<String> = tuples
                .into_iter()
                .enumerate()
                .filter_map(|(k, mut tuple)| tuple.pop().map(|value| (k, value)))
                .map(|(k, value)| {
                    self.key_match(&mut params, keys[0], format!("d0_{k}"), value)
                })
                .collect();
            format!("({})", alternatives.join(" OR "))
        } else {
            let alternatives: Vec<String> = tuples
                .into_iter()
                .enumerate()
                .map(|(k, tuple)| {
                    let parts: Vec<String> = keys
                        .iter()
                        .zip(tuple)
                        .enumerate()
                        .map(|(j, (column, value))| {
                            self.key_match(&mut params, column, format!("d{k}_{j}"), value)
                        })
                        .collect();
                    format!("({})", parts.join(" AND "))
                })
                .collect();
            alternatives.join(" OR ")
        };
        Some(SqlQuery {
            statement: format!("DELETE FROM {} WHERE {}", self.table_name(), condition),
            params,
        })
    }

    fn key_match(
        &self,
        params: &mut Params,
        column: &ColumnDescriptor,
        name: String,
        value: Value,
    ) -> String {
        let ident = quote_ident(&column.name);
        if value.is_null() {
            format!("{ident} IS NULL")
        } else {
            let placeholder = self.bind(params, name, value);
            format!("{ident} = {placeholder}")
        }
    }
}
