//! Pre-execution hooks.
//!
//! Interceptors see every Select/Insert/Update/Delete before any SQL is
//! sent and may veto it by returning [`Verdict::Abort`].

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::entity::Record;
use crate::error::{Error, Result};
use crate::query::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Select => "select",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        })
    }
}

/// What the pending operation applies to.
#[derive(Debug, Clone, Copy)]
pub enum EventTarget<'a> {
    Condition {
        condition: Option<&'a str>,
        params: Option<&'a Params>,
    },
    Collection(&'a [Record]),
}

/// Snapshot of a pending operation.
#[derive(Debug, Clone, Copy)]
pub struct QueryEvent<'a> {
    pub kind: OperationKind,
    /// Rust type name of the entity.
    pub entity: &'static str,
    pub table: &'a str,
    pub target: EventTarget<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Abort,
}

pub trait Interceptor: Send + Sync {
    fn before(&self, event: &QueryEvent<'_>) -> Verdict;
}

impl<F> Interceptor for F
where
    F: Fn(&QueryEvent<'_>) -> Verdict + Send + Sync,
{
    fn before(&self, event: &QueryEvent<'_>) -> Verdict {
        self(event)
    }
}

/// Registered interceptors, notified in registration order.
#[derive(Default)]
pub struct Interceptors {
    hooks: RwLock<Vec<Arc<dyn Interceptor>>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hook: Arc<dyn Interceptor>) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every interceptor; the first abort stops notification and
    /// fails the operation.
    pub fn notify(&self, event: &QueryEvent<'_>) -> Result<()> {
        let hooks = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            if hook.before(event) == Verdict::Abort {
                tracing::warn!(
                    kind = %event.kind,
                    table = event.table,
                    "operation aborted by interceptor"
                );
                return Err(Error::Aborted {
                    kind: event.kind,
                    table: event.table.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("count", &self.len())
            .finish()
    }
}
