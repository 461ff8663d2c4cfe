use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use rusqlite::{params, Connection, TransactionBehavior};

use crate::config::DatabaseConfig;
use crate::entity::{Entity, Record};
use crate::error::{Error, Result};
use crate::insert::{BatchInsert, WriteScope, NO_ROWID};
use crate::intercept::{EventTarget, Interceptor, Interceptors, OperationKind, QueryEvent, Verdict};
use crate::materialize::{map_columns, raw_value, Rows};
use crate::query::{Params, QueryBuilder, SqlQuery, PLACEHOLDER};
use crate::schema::TableDescriptor;
use crate::types::Value;

fn prepare_bound<'c>(conn: &'c Connection, query: &SqlQuery) -> Result<rusqlite::Statement<'c>> {
    tracing::debug!(sql = %query.statement, params = query.params.len(), "executing");
    let mut stmt = conn.prepare(&query.statement)?;
    for (name, value) in query.params.iter() {
        if value.is_null() {
            continue;
        }
        if let Some(index) = stmt.parameter_index(&format!("{PLACEHOLDER}{name}"))? {
            stmt.raw_bind_parameter(index, value)?;
        }
    }
    Ok(stmt)
}

/// Run a bound statement and return the number of affected rows.
pub(crate) fn execute(conn: &Connection, query: &SqlQuery) -> Result<usize> {
    let mut stmt = prepare_bound(conn, query)?;
    Ok(stmt.raw_execute()?)
}

/// Run a bound query and drain its cursor.
pub(crate) fn fetch(conn: &Connection, query: &SqlQuery) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let mut stmt = prepare_bound(conn, query)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            cells.push(raw_value(row.get_ref(i)?));
        }
        out.push(cells);
    }
    Ok((columns, out))
}

/// Mapped access to one SQLite database.
///
/// Owns the single connection; every operation takes the connection lock
/// for its duration, so one `Database` can be shared between threads.
pub struct Database {
    config: DatabaseConfig,
    connection: Mutex<Connection>,
    descriptors: RwLock<HashMap<TypeId, Arc<TableDescriptor>>>,
    interceptors: Interceptors,
}

impl Database {
    /// Open the database described by `config`
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let connection = match &config.db_path {
            Some(path) => {
                tracing::info!(path = %path, "opening sqlite database");
                Connection::open(path)?
            }
            None => {
                tracing::info!("opening in-memory sqlite database");
                Connection::open_in_memory()?
            }
        };
        if let Some(ms) = config.busy_timeout_ms {
            connection.busy_timeout(Duration::from_millis(ms))?;
        }
        if config.foreign_keys {
            connection.execute_batch("PRAGMA foreign_keys = ON")?;
        }
        Ok(Self {
            config,
            connection: Mutex::new(connection),
            descriptors: RwLock::new(HashMap::new()),
            interceptors: Interceptors::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(DatabaseConfig::in_memory())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn builder<'a>(&self, table: &'a TableDescriptor) -> QueryBuilder<'a> {
        QueryBuilder::new(table, self.config.enum_storage)
    }

    /// Resolved descriptor for `T`, resolved on first use.
    pub fn descriptor<T: Entity>(&self) -> Result<Arc<TableDescriptor>> {
        let key = TypeId::of::<T>();
        if let Some(found) = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(found.clone());
        }
        let resolved = Arc::new(TableDescriptor::resolve(&T::schema())?);
        let mut descriptors = self.descriptors.write().unwrap_or_else(PoisonError::into_inner);
        Ok(descriptors.entry(key).or_insert(resolved).clone())
    }

    /// Register an interceptor closure.
    pub fn intercept<F>(&self, hook: F)
    where
        F: Fn(&QueryEvent<'_>) -> Verdict + Send + Sync + 'static,
    {
        self.interceptors.add(Arc::new(hook));
    }

    pub fn add_interceptor(&self, hook: Arc<dyn Interceptor>) {
        self.interceptors.add(hook);
    }

    fn notify<T: Entity>(
        &self,
        kind: OperationKind,
        table: &TableDescriptor,
        target: EventTarget<'_>,
    ) -> Result<()> {
        self.interceptors.notify(&QueryEvent {
            kind,
            entity: type_name::<T>(),
            table: &table.name,
            target,
        })
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create the table for `T`. Tables referenced by foreign keys must exist.
    pub fn create_table<T: Entity>(&self) -> Result<()> {
        let table = self.descriptor::<T>()?;
        for referenced in table.referenced_tables() {
            if !self.table_exists(referenced)? {
                return Err(Error::usage(format!(
                    "`{}` references missing table `{referenced}`",
                    table.name
                )));
            }
        }
        tracing::info!(table = %table.name, "creating table");
        execute(&self.conn(), &self.builder(&table).create_table())?;
        Ok(())
    }

    pub fn drop_table<T: Entity>(&self) -> Result<()> {
        let table = self.descriptor::<T>()?;
        tracing::info!(table = %table.name, "dropping table");
        execute(&self.conn(), &self.builder(&table).drop_table())?;
        Ok(())
    }

    /// Every row of `T`'s table.
    pub fn select<T: Entity>(&self) -> Result<Rows<T>> {
        self.select_inner(None, None)
    }

    /// Rows matching `condition`; `@name` placeholders bind from `params`.
    pub fn select_where<T: Entity>(
        &self,
        condition: &str,
        params: Option<&Params>,
    ) -> Result<Rows<T>> {
        self.select_inner(Some(condition), params)
    }

    fn select_inner<T: Entity>(
        &self,
        condition: Option<&str>,
        params: Option<&Params>,
    ) -> Result<Rows<T>> {
        let table = self.descriptor::<T>()?;
        let query = self.builder(&table).select(condition, params)?;
        self.notify::<T>(
            OperationKind::Select,
            &table,
            EventTarget::Condition { condition, params },
        )?;
        let (columns, rows) = fetch(&self.conn(), &query)?;
        let mapping = map_columns(&table, &columns, self.config.column_matching)?;
        Ok(Rows::new(table, mapping, rows))
    }

    /// Number of rows of `T`, optionally filtered. Not intercepted.
    pub fn count<T: Entity>(
        &self,
        condition: Option<&str>,
        params: Option<&Params>,
    ) -> Result<usize> {
        let table = self.descriptor::<T>()?;
        let query = self.builder(&table).count(condition, params)?;
        let (_, rows) = fetch(&self.conn(), &query)?;
        match rows.first().and_then(|r| r.first()) {
            Some(Value::Integer(n)) => Ok(*n as usize),
            other => Err(Error::conversion("COUNT(*)", format!("unexpected {other:?}"))),
        }
    }

    pub fn insert<T: Entity>(&self, item: &mut T) -> Result<i64> {
        self.insert_all(std::slice::from_mut(item))
    }

    /// Insert a batch and write generated identifiers back into the items.
    ///
    /// Returns the identifier of the first item, or [`NO_ROWID`].
    pub fn insert_all<T: Entity>(&self, items: &mut [T]) -> Result<i64> {
        let table = self.descriptor::<T>()?;
        let records: Vec<Record> = items.iter().map(Entity::to_record).collect();
        self.notify::<T>(OperationKind::Insert, &table, EventTarget::Collection(&records))?;
        if records.is_empty() {
            return Ok(NO_ROWID);
        }

        let batch = BatchInsert::new(&table, self.builder(&table), self.config.id_assignment);
        let ids = batch.run(&mut self.conn(), &records)?;

        if let Some(alias) = table.rowid_alias() {
            for ((item, record), id) in items.iter_mut().zip(&records).zip(&ids) {
                if record.value_or_null(&alias.name).is_null() {
                    tracing::trace!(table = %table.name, id, "assigning rowid");
                    item.set_value(&alias.name, Value::Integer(*id))?;
                }
            }
        }
        Ok(ids.first().copied().unwrap_or(NO_ROWID))
    }

    pub fn update<T: Entity>(&self, item: &T) -> Result<usize> {
        self.update_all(std::slice::from_ref(item))
    }

    /// Update every item by primary key; returns the total affected rows.
    pub fn update_all<T: Entity>(&self, items: &[T]) -> Result<usize> {
        let table = self.descriptor::<T>()?;
        let records: Vec<Record> = items.iter().map(Entity::to_record).collect();
        let statements = self.builder(&table).update(&records)?;
        self.notify::<T>(OperationKind::Update, &table, EventTarget::Collection(&records))?;
        if statements.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let scope = WriteScope::begin(&mut conn, TransactionBehavior::Deferred)?;
        let mut affected = 0;
        for statement in &statements {
            affected += execute(&scope, statement)?;
        }
        scope.commit()?;
        Ok(affected)
    }

    pub fn delete<T: Entity>(&self, item: &T) -> Result<usize> {
        self.delete_all(std::slice::from_ref(item))
    }

    /// Delete the rows whose key values match any of `items`.
    pub fn delete_all<T: Entity>(&self, items: &[T]) -> Result<usize> {
        let table = self.descriptor::<T>()?;
        let records: Vec<Record> = items.iter().map(Entity::to_record).collect();
        self.notify::<T>(OperationKind::Delete, &table, EventTarget::Collection(&records))?;
        match self.builder(&table).delete_records(&records) {
            Some(query) => execute(&self.conn(), &query),
            None => Ok(0),
        }
    }

    pub fn delete_where<T: Entity>(
        &self,
        condition: &str,
        params: Option<&Params>,
    ) -> Result<usize> {
        let table = self.descriptor::<T>()?;
        let query = self.builder(&table).delete_where(condition, params)?;
        self.notify::<T>(
            OperationKind::Delete,
            &table,
            EventTarget::Condition {
                condition: Some(condition),
                params,
            },
        )?;
        execute(&self.conn(), &query)
    }

    /// Run arbitrary SQL with `@name` parameters.
    pub fn execute(&self, statement: &str, params: &Params) -> Result<usize> {
        let query = SqlQuery::new(statement).with_params(params.clone());
        execute(&self.conn(), &query)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql, "executing batch");
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    /// True while a caller-opened transaction is active.
    pub fn in_transaction(&self) -> bool {
        !self.conn().is_autocommit()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}
