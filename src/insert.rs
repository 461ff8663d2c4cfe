//! Batch insert and row identifier assignment.
//!
//! Tables with an AUTOINCREMENT rowid alias are inserted with one multi-row
//! statement; identifiers are then derived from the generator counter read
//! inside the same exclusive transaction. Every other table, or every table
//! when [`IdAssignment::PerRow`] is configured, inserts row by row and reads
//! `last_insert_rowid()` after each statement.

use std::ops::Deref;

use rusqlite::{Connection, OptionalExtension, Savepoint, Transaction, TransactionBehavior};

use crate::config::IdAssignment;
use crate::entity::Record;
use crate::error::{Error, Result};
use crate::query::{quote_ident, QueryBuilder};
use crate::schema::TableDescriptor;
use crate::sqlite::execute;

/// Returned when no identifier is known: empty batch or WITHOUT ROWID table.
pub const NO_ROWID: i64 = -1;

/// A transaction, or a savepoint when the connection is already inside one.
pub(crate) enum WriteScope<'c> {
    Transaction(Transaction<'c>),
    Savepoint(Savepoint<'c>),
}

impl<'c> WriteScope<'c> {
    pub(crate) fn begin(conn: &'c mut Connection, behavior: TransactionBehavior) -> Result<Self> {
        if conn.is_autocommit() {
            Ok(WriteScope::Transaction(conn.transaction_with_behavior(behavior)?))
        } else {
            Ok(WriteScope::Savepoint(conn.savepoint()?))
        }
    }

    pub(crate) fn commit(self) -> Result<()> {
        match self {
            WriteScope::Transaction(tx) => tx.commit()?,
            WriteScope::Savepoint(sp) => sp.commit()?,
        }
        Ok(())
    }
}

impl Deref for WriteScope<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            WriteScope::Transaction(tx) => &**tx,
            WriteScope::Savepoint(sp) => &**sp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPath {
    Bulk,
    PerRow,
}

impl InsertPath {
    pub fn for_table(table: &TableDescriptor, configured: IdAssignment) -> Self {
        match (table.autoincrement_column(), configured) {
            (Some(_), IdAssignment::Bulk) => InsertPath::Bulk,
            _ => InsertPath::PerRow,
        }
    }
}

/// Identifiers for a batch inserted after `counter`, in input order.
///
/// `reservations[i]` is the caller-supplied identifier of item `i`, if any.
/// Reserved values are kept; the cursor skips past any reservation at or
/// above it, so auto-assigned values never collide with a reservation. An
/// unreserved item after `i64::MAX` has been handed out is a usage error.
pub fn assign_identifiers(counter: i64, reservations: &[Option<i64>]) -> Result<Vec<i64>> {
    let mut cursor = counter.checked_add(1);
    reservations
        .iter()
        .map(|reserved| match *reserved {
            Some(id) => {
                if cursor.is_some_and(|next| id >= next) {
                    cursor = id.checked_add(1);
                }
                Ok(id)
            }
            None => {
                let id = cursor.ok_or_else(|| Error::usage("rowid space exhausted"))?;
                cursor = id.checked_add(1);
                Ok(id)
            }
        })
        .collect()
}

/// Highest identifier handed out so far for `table`.
pub fn generator_counter(conn: &Connection, table: &TableDescriptor) -> Result<i64> {
    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            [&table.name],
            |row| row.get(0),
        )
        .optional()?;
    let max: i64 = conn.query_row(
        &format!("SELECT COALESCE(MAX(rowid), 0) FROM {}", quote_ident(&table.name)),
        [],
        |row| row.get(0),
    )?;
    Ok(seq.unwrap_or(0).max(max))
}

/// Runs one insert batch against a locked connection.
pub(crate) struct BatchInsert<'a> {
    table: &'a TableDescriptor,
    builder: QueryBuilder<'a>,
    path: InsertPath,
}

impl<'a> BatchInsert<'a> {
    pub(crate) fn new(
        table: &'a TableDescriptor,
        builder: QueryBuilder<'a>,
        assignment: IdAssignment,
    ) -> Self {
        Self {
            table,
            builder,
            path: InsertPath::for_table(table, assignment),
        }
    }

    fn reservations(&self, records: &[Record]) -> Vec<Option<i64>> {
        match self.table.rowid_alias() {
            Some(alias) => records
                .iter()
                .map(|r| r.get(&alias.name).and_then(|v| v.as_i64()))
                .collect(),
            None => vec![None; records.len()],
        }
    }

    /// Insert `records` and return the identifier of every row, in order.
    ///
    /// Nothing is returned for a WITHOUT ROWID table.
    pub(crate) fn run(&self, conn: &mut Connection, records: &[Record]) -> Result<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let ids = match self.path {
            InsertPath::Bulk => self.run_bulk(conn, records)?,
            InsertPath::PerRow => self.run_per_row(conn, records)?,
        };
        if self.table.without_rowid {
            return Ok(Vec::new());
        }
        Ok(ids)
    }

    fn run_per_row(&self, conn: &mut Connection, records: &[Record]) -> Result<Vec<i64>> {
        tracing::debug!(table = %self.table.name, rows = records.len(), "per-row insert");
        let scope = WriteScope::begin(conn, TransactionBehavior::Deferred)?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            execute(&scope, &self.builder.insert(record))?;
            ids.push(scope.last_insert_rowid());
        }
        scope.commit()?;
        Ok(ids)
    }

    fn run_bulk(&self, conn: &mut Connection, records: &[Record]) -> Result<Vec<i64>> {
        tracing::debug!(table = %self.table.name, rows = records.len(), "bulk insert");
        let scope = WriteScope::begin(conn, TransactionBehavior::Exclusive)?;
        let counter = generator_counter(&scope, self.table)?;
        let ids = assign_identifiers(counter, &self.reservations(records))?;
        for statement in self.builder.insert_many(records) {
            execute(&scope, &statement)?;
        }
        scope.commit()?;
        tracing::trace!(table = %self.table.name, counter, first = ids[0], "identifiers assigned");
        Ok(ids)
    }
}
