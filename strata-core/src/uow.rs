//! Deferred writes.
//!
//! A backend unit of work queues commands in a [`Batch`] and replays them on
//! commit: creates first, then deletes, then updates, each group in
//! insertion order. The composite [`UnitOfWork`] commits several backends
//! one after the other. There is no cross-backend rollback: a failure stops
//! the remaining members, and members already committed stay committed.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::DataError;
use crate::resource::{BackendKind, Context};

/// Boxed future returned by object-safe commit methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Kind of a queued command. The ordering is the replay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandKind {
    Create,
    Delete,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowState {
    Open,
    Committing,
    Closed,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BatchInner<C> {
    state: UowState,
    entries: Vec<(CommandKind, C)>,
}

/// Shared, clonable command queue of one backend unit of work.
pub struct Batch<C> {
    inner: Arc<Mutex<BatchInner<C>>>,
}

impl<C> Clone for Batch<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Default for Batch<C> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BatchInner {
                state: UowState::Open,
                entries: Vec::new(),
            })),
        }
    }
}

impl<C> Batch<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, kind: CommandKind, command: C) -> Result<(), DataError> {
        let mut inner = lock(&self.inner);
        if inner.state != UowState::Open {
            return Err(DataError::UnitOfWorkClosed);
        }
        inner.entries.push((kind, command));
        Ok(())
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> UowState {
        lock(&self.inner).state
    }

    /// Copy of the queued commands, in insertion order.
    pub fn snapshot(&self) -> Vec<(CommandKind, C)>
    where
        C: Clone,
    {
        lock(&self.inner).entries.clone()
    }

    /// Move to `Committing` and take the queued commands in replay order.
    ///
    /// The queue is empty from here on. The batch becomes `Closed` when the
    /// returned [`Drain`] is dropped, whatever the outcome of the replay.
    pub fn begin_commit(&self) -> Result<Drain<C>, DataError> {
        let mut inner = lock(&self.inner);
        if inner.state != UowState::Open {
            return Err(DataError::UnitOfWorkClosed);
        }
        inner.state = UowState::Committing;
        let mut commands = std::mem::take(&mut inner.entries);
        commands.sort_by_key(|(kind, _)| *kind);
        Ok(Drain {
            batch: Arc::clone(&self.inner),
            commands,
        })
    }
}

/// Commands taken out of a [`Batch`] for replay.
pub struct Drain<C> {
    batch: Arc<Mutex<BatchInner<C>>>,
    commands: Vec<(CommandKind, C)>,
}

impl<C> Drain<C> {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(CommandKind, C)> {
        self.commands.iter()
    }

    pub fn kinds(&self) -> Vec<CommandKind> {
        self.commands.iter().map(|(kind, _)| *kind).collect()
    }
}

impl<C> Drop for Drain<C> {
    fn drop(&mut self) {
        lock(&self.batch).state = UowState::Closed;
    }
}

/// Per-backend unit of work, as seen by the composite.
pub trait BackendUnitOfWork: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    fn state(&self) -> UowState;

    /// Number of queued commands.
    fn pending(&self) -> usize;

    /// Replay the queue. Transactional backends run the replay in a single
    /// transaction and roll it back on the first failure.
    fn commit<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), DataError>>;

    fn as_any(&self) -> &dyn Any;
}

/// Identity of a composite member: backend kind and resource alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UowKey {
    pub kind: BackendKind,
    pub name: String,
}

impl UowKey {
    pub fn new(kind: BackendKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for UowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

struct CompositeInner {
    state: UowState,
    members: Vec<(UowKey, Arc<dyn BackendUnitOfWork>)>,
}

/// Units of work of several backends, committed in enlistment order.
///
/// Cheap to clone; clones share the same members.
#[derive(Clone)]
pub struct UnitOfWork {
    inner: Arc<Mutex<CompositeInner>>,
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CompositeInner {
                state: UowState::Open,
                members: Vec::new(),
            })),
        }
    }
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// The member registered under `key`, created with `make` on first use.
    pub fn enlist<U, F>(&self, key: UowKey, make: F) -> Result<U, DataError>
    where
        U: BackendUnitOfWork + Clone,
        F: FnOnce() -> U,
    {
        let mut inner = lock(&self.inner);
        if inner.state != UowState::Open {
            return Err(DataError::UnitOfWorkClosed);
        }
        if let Some((_, member)) = inner.members.iter().find(|(k, _)| *k == key) {
            return member.as_any().downcast_ref::<U>().cloned().ok_or_else(|| {
                DataError::Other(format!("unit of work member {key} has another type"))
            });
        }
        let member = make();
        inner.members.push((key, Arc::new(member.clone())));
        Ok(member)
    }

    pub fn members(&self) -> Vec<UowKey> {
        lock(&self.inner)
            .members
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Total number of queued commands across members.
    pub fn pending(&self) -> usize {
        lock(&self.inner)
            .members
            .iter()
            .map(|(_, member)| member.pending())
            .sum()
    }

    pub fn state(&self) -> UowState {
        lock(&self.inner).state
    }

    /// Commit every member in enlistment order.
    ///
    /// The first failing member stops the loop; its error is returned as
    /// [`DataError::Commit`] naming the member. Members after it are not
    /// committed, members before it are not rolled back.
    pub async fn commit(&self, ctx: &Context) -> Result<(), DataError> {
        let members = {
            let mut inner = lock(&self.inner);
            if inner.state != UowState::Open {
                return Err(DataError::UnitOfWorkClosed);
            }
            inner.state = UowState::Committing;
            inner.members.clone()
        };

        let result = commit_members(&members, ctx).await;
        lock(&self.inner).state = UowState::Closed;
        result
    }
}

async fn commit_members(
    members: &[(UowKey, Arc<dyn BackendUnitOfWork>)],
    ctx: &Context,
) -> Result<(), DataError> {
    for (key, member) in members {
        let pending = member.pending();
        if let Err(err) = member.commit(ctx).await {
            tracing::warn!(member = %key, error = %err, "Unit of work commit failed");
            return Err(DataError::Commit {
                backend: key.to_string(),
                source: Box::new(err),
            });
        }
        tracing::info!(member = %key, commands = pending, "Unit of work committed");
    }
    Ok(())
}
