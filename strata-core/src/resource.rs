use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DataError;
use crate::repository::Repository;
use crate::uow::{BackendUnitOfWork, UnitOfWork, UowKey};

/// Storage engine family of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Mongo,
    MySql,
    Postgres,
    Sqlite,
    Elasticsearch,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Mongo => "mongo",
            BackendKind::MySql => "mysql",
            BackendKind::Postgres => "postgres",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Elasticsearch => "elasticsearch",
        }
    }

    pub fn is_sql(self) -> bool {
        matches!(
            self,
            BackendKind::MySql | BackendKind::Postgres | BackendKind::Sqlite
        )
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(BackendKind::Mongo),
            "mysql" | "mariadb" => Ok(BackendKind::MySql),
            "postgres" | "postgresql" | "timescale" => Ok(BackendKind::Postgres),
            "sqlite" => Ok(BackendKind::Sqlite),
            "elasticsearch" | "elastic" => Ok(BackendKind::Elasticsearch),
            other => Err(DataError::NotConfigured(format!("unknown backend kind `{other}`"))),
        }
    }
}

/// Execution context threaded through every backend call: a cancellation
/// token and an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A context cancelled together with this one, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// `Cancelled` or `Timeout` once the context has ended.
    ///
    /// Blocking work that cannot be dropped mid-flight calls this before
    /// making its effects durable.
    pub fn check(&self) -> Result<(), DataError> {
        if self.cancel.is_cancelled() {
            return Err(DataError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DataError::Timeout),
            _ => Ok(()),
        }
    }

    /// Drive `fut`, failing with `Cancelled` or `Timeout` if the context
    /// ends first. The in-flight backend call is dropped in that case.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, DataError>
    where
        F: Future<Output = Result<T, DataError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(DataError::Cancelled);
        }
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| DataError::Timeout)?,
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DataError::Cancelled),
            result = bounded => result,
        }
    }
}

/// An open handle on one backend instance.
///
/// ```ignore
/// let people = factory.build_by_name::<SqlxResource>("main")?;
/// let uow = UnitOfWork::new();
/// let repo = people.db_with(&ctx, &uow)?;
/// repo.create(&mut person).await?;   // queued
/// uow.commit(&ctx).await?;
/// ```
pub trait Resource: Clone + Send + Sync + 'static {
    type Repository: Repository;
    type UnitOfWork: BackendUnitOfWork + Clone;

    fn kind(&self) -> BackendKind;

    /// Alias the resource was registered under.
    fn name(&self) -> &str;

    /// A fresh, empty unit of work for this backend.
    fn uow(&self) -> Self::UnitOfWork;

    /// Repository executing writes immediately.
    fn db(&self, ctx: &Context) -> Self::Repository;

    /// Repository queuing writes into `uow`.
    fn db_in(&self, ctx: &Context, uow: &Self::UnitOfWork) -> Self::Repository;

    /// Repository queuing writes into this backend's member of `uow`,
    /// enlisting one if needed.
    fn db_with(&self, ctx: &Context, uow: &UnitOfWork) -> Result<Self::Repository, DataError> {
        let key = UowKey::new(self.kind(), self.name());
        let member = uow.enlist(key, || self.uow())?;
        Ok(self.db_in(ctx, &member))
    }
}
