//! Run-once tracking of task identities.
//!
//! A [`Scope`] maps each [`TaskId`] to a [`CompletionCell`]. The first caller
//! for an identity runs the body; every other caller, concurrent or later,
//! waits on the same cell and receives a clone of the cached result.
//!
//! The table lock is only held to look up or insert a cell. Bodies run
//! outside of it, so tasks with different identities never contend.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

use super::error::TaskError;
use super::types::{ScopeId, TaskId};

/// How a derived scope relates to the scope it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateMode {
    /// Share the parent's table.
    #[default]
    Inherit,
    /// Start from a copy of the parent's entries. Results the parent already
    /// holds are visible; tasks first run on either side after the split are
    /// not.
    Isolate,
    /// Start empty, so every task may run again.
    Reset,
}

/// A one-shot guard holding the result of a task body.
#[derive(Debug, Default)]
pub struct CompletionCell {
    result: OnceCell<Result<(), TaskError>>,
}

impl CompletionCell {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` if this cell has not run yet, otherwise wait for and return
    /// the cached result.
    pub async fn run<F, Fut>(&self, body: F) -> Result<(), TaskError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), TaskError>>,
    {
        self.result.get_or_init(body).await.clone()
    }

    /// The cached result, if the body has finished.
    pub fn result(&self) -> Option<&Result<(), TaskError>> {
        self.result.get()
    }

    /// Whether the body has finished.
    pub fn is_complete(&self) -> bool {
        self.result.initialized()
    }
}

/// Identity table controlling whether re-running a task re-invokes its body.
#[derive(Debug)]
pub struct Scope {
    id: ScopeId,
    cells: Mutex<HashMap<TaskId, Arc<CompletionCell>>>,
}

impl Scope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self {
            id: ScopeId::new(),
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Get the scope's identifier.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Derive a scope according to `mode`.
    pub fn derive(self: &Arc<Self>, mode: StateMode) -> Arc<Scope> {
        match mode {
            StateMode::Inherit => Arc::clone(self),
            StateMode::Isolate => {
                let copied = self.table().clone();
                Arc::new(Self {
                    id: ScopeId::new(),
                    cells: Mutex::new(copied),
                })
            }
            StateMode::Reset => Arc::new(Self::new()),
        }
    }

    /// Run `body` at most once for `id` in this scope.
    pub async fn run_once<F, Fut>(&self, id: &TaskId, body: F) -> Result<(), TaskError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), TaskError>>,
    {
        let cell = self.cell(id);
        cell.run(body).await
    }

    /// Get or create the completion cell for `id`.
    pub fn cell(&self, id: &TaskId) -> Arc<CompletionCell> {
        let mut cells = self.table();
        Arc::clone(cells.entry(id.clone()).or_default())
    }

    /// Whether the task with `id` has finished in this scope.
    pub fn is_complete(&self, id: &TaskId) -> bool {
        self.table().get(id).is_some_and(|cell| cell.is_complete())
    }

    /// Number of identities observed in this scope.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no identity has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    // The table is never left half-updated, so a poisoned lock is still usable.
    fn table(&self) -> MutexGuard<'_, HashMap<TaskId, Arc<CompletionCell>>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}
