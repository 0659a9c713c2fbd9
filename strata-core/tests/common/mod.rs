//! In-memory backend recording every call in a journal.
#![allow(dead_code)]

use std::any::Any;
use std::sync::{Arc, Mutex};

use strata_core::{
    assign_identity, metadata, BackendKind, BackendUnitOfWork, Batch, BoxFuture, CommandKind,
    Context, DataError, Entity, Predicate, Query, QueryState, Repository, Resource, Statement,
    Target, UowState, UpdateRequest,
};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

#[derive(Clone, Debug)]
pub struct MemResource {
    pub name: String,
    pub kind: BackendKind,
    pub journal: Journal,
    pub fail_commit: bool,
}

impl MemResource {
    pub fn new(name: &str, kind: BackendKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            journal: Journal::default(),
            fail_commit: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_commit = true;
        self
    }
}

impl Resource for MemResource {
    type Repository = MemRepository;
    type UnitOfWork = MemUow;

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn uow(&self) -> MemUow {
        MemUow {
            kind: self.kind,
            batch: Batch::new(),
            journal: Arc::clone(&self.journal),
            fail: self.fail_commit,
        }
    }

    fn db(&self, _ctx: &Context) -> MemRepository {
        MemRepository {
            journal: Arc::clone(&self.journal),
            uow: None,
        }
    }

    fn db_in(&self, _ctx: &Context, uow: &MemUow) -> MemRepository {
        MemRepository {
            journal: Arc::clone(&self.journal),
            uow: Some(uow.clone()),
        }
    }
}

#[derive(Clone)]
pub struct MemUow {
    kind: BackendKind,
    batch: Batch<String>,
    journal: Journal,
    fail: bool,
}

impl BackendUnitOfWork for MemUow {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn state(&self) -> UowState {
        self.batch.state()
    }

    fn pending(&self) -> usize {
        self.batch.len()
    }

    fn commit<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<(), DataError>> {
        Box::pin(async move {
            let drain = self.batch.begin_commit()?;
            if self.fail {
                return Err(DataError::Other("commit refused".into()));
            }
            let mut journal = self.journal.lock().unwrap();
            for (_, command) in drain.iter() {
                journal.push(format!("{}: {command}", self.kind));
            }
            Ok(())
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MemRepository {
    journal: Journal,
    uow: Option<MemUow>,
}

impl MemRepository {
    fn dispatch(&self, kind: CommandKind, command: String) -> Result<(), DataError> {
        match &self.uow {
            Some(uow) => uow.batch.push(kind, command),
            None => {
                self.journal.lock().unwrap().push(command);
                Ok(())
            }
        }
    }
}

fn describe<F: std::fmt::Debug>(target: &Target<F>) -> String {
    match target {
        Target::Filter(filter) => format!("{filter:?}"),
        Target::Identity(id) => format!("id={id}"),
    }
}

impl Repository for MemRepository {
    type Filter = Predicate;
    type Patch = Vec<String>;
    type Query = MemQuery;

    async fn create<T: Entity>(&self, entity: &mut T) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        assign_identity(entity, &meta, None)?;
        self.dispatch(
            CommandKind::Create,
            format!("create {} id={}", T::table(), entity.id()),
        )
    }

    async fn update<T: Entity>(
        &self,
        entity: &T,
        request: UpdateRequest<Vec<String>, Predicate>,
    ) -> Result<(), DataError> {
        let target =
            Target::resolve(entity, request.filter).ok_or(DataError::UpdateFullNotAllowed)?;
        self.dispatch(
            CommandKind::Update,
            format!("update {} {}", T::table(), describe(&target)),
        )
    }

    async fn delete<T: Entity>(
        &self,
        entity: &T,
        filter: Option<Predicate>,
    ) -> Result<(), DataError> {
        let target = Target::resolve(entity, filter).ok_or(DataError::DeleteFullNotAllowed)?;
        self.dispatch(
            CommandKind::Delete,
            format!("delete {} {}", T::table(), describe(&target)),
        )
    }

    fn query(&self) -> MemQuery {
        MemQuery {
            state: QueryState::default(),
            journal: Arc::clone(&self.journal),
        }
    }
}

pub struct MemQuery {
    state: QueryState<Predicate>,
    journal: Journal,
}

impl MemQuery {
    fn record(&mut self, op: &str) {
        let state = self.state.take();
        let filter = state.filter.as_ref().map(|f| f.clause().to_string()).unwrap_or_default();
        let paging = state
            .paging(self.default_page_size())
            .map(|p| format!(" page={} size={}", p.page, p.size))
            .unwrap_or_default();
        self.journal
            .lock()
            .unwrap()
            .push(format!("{op} [{filter}]{paging}"));
    }
}

impl Query for MemQuery {
    type Filter = Predicate;
    type Statement = Statement;

    fn state_mut(&mut self) -> &mut QueryState<Predicate> {
        &mut self.state
    }

    fn default_page_size(&self) -> u64 {
        20
    }

    async fn find<T: Entity>(&mut self, out: &mut Vec<T>) -> Result<(), DataError> {
        self.record("find");
        out.clear();
        Ok(())
    }

    async fn first<T: Entity>(&mut self, _out: &mut T) -> Result<(), DataError> {
        self.record("first");
        Ok(())
    }

    async fn count<T: Entity>(&mut self) -> Result<u64, DataError> {
        self.record("count");
        Ok(42)
    }

    async fn exec<T: Entity>(
        &mut self,
        out: &mut Vec<T>,
        statement: Statement,
    ) -> Result<(), DataError> {
        self.state.take();
        if statement.is_empty() {
            return Err(DataError::EmptyStatement);
        }
        out.clear();
        Ok(())
    }
}
