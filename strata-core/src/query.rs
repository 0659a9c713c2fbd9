//! The fluent query contract shared by every backend.
//!
//! Builder calls accumulate into a [`QueryState`]; terminal calls (`find`,
//! `to_array`, `first`, `count`, `exec`) take that state out before doing
//! any I/O, so a builder is always empty again afterwards, whether the call
//! succeeded or not.
//!
//! ```ignore
//! let mut q = repo.query();
//! let mut adults = Vec::new();
//! q.filter(Predicate::new("age >= ?").arg(18)).desc(["age"]).page(1).page_size(50);
//! q.find(&mut adults).await?;
//! let everyone = q.count::<Person>().await?; // no filter any more
//! ```

use std::future::Future;

use crate::entity::Entity;
use crate::error::DataError;
use crate::page::{Page, Paging};

/// State accumulated by a query builder between terminal calls.
#[derive(Debug, Clone)]
pub struct QueryState<F> {
    pub filter: Option<F>,
    pub fields: Vec<String>,
    pub asc: Vec<String>,
    pub desc: Vec<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    /// Table, collection or index to use instead of the entity's own.
    pub table: Option<String>,
}

impl<F> Default for QueryState<F> {
    fn default() -> Self {
        Self {
            filter: None,
            fields: Vec::new(),
            asc: Vec::new(),
            desc: Vec::new(),
            page: None,
            page_size: None,
            table: None,
        }
    }
}

impl<F> QueryState<F> {
    /// Move the state out, leaving an empty one behind.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_none()
            && self.fields.is_empty()
            && self.asc.is_empty()
            && self.desc.is_empty()
            && self.page.is_none()
            && self.page_size.is_none()
            && self.table.is_none()
    }

    /// Normalized paging, or `None` if neither page nor page size was set.
    pub fn paging(&self, default_page_size: u64) -> Option<Paging> {
        Paging::from_parts(self.page, self.page_size, default_page_size)
    }
}

fn non_blank<I, S>(names: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(Into::into)
        .filter(|name: &String| !name.trim().is_empty())
}

/// Fluent, stateful query builder.
///
/// `Filter` is the backend's predicate type (raw SQL, a BSON document, a
/// search DSL clause) and `Statement` what `exec` accepts.
///
/// Result arguments are typed (`&mut Vec<T>`, `&mut T` with `T: Entity`),
/// so passing a non-collection or a non-entity is a compile error rather
/// than a runtime failure.
pub trait Query: Send {
    type Filter: Send + Sync;
    type Statement: Send;

    fn state_mut(&mut self) -> &mut QueryState<Self::Filter>;

    /// Page size used when `page` is set without `page_size` (or with 0).
    fn default_page_size(&self) -> u64;

    /// Where: replace the filter.
    fn filter(&mut self, filter: impl Into<Self::Filter>) -> &mut Self
    where
        Self: Sized,
    {
        self.state_mut().filter = Some(filter.into());
        self
    }

    /// Where with no predicate: drop the filter.
    fn clear_filter(&mut self) -> &mut Self
    where
        Self: Sized,
    {
        self.state_mut().filter = None;
        self
    }

    /// Restrict the projection. Blank names are ignored.
    fn fields<I, S>(&mut self, names: I) -> &mut Self
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_mut().fields.extend(non_blank(names));
        self
    }

    /// Append ascending sort keys. Ascending keys sort before descending ones.
    fn asc<I, S>(&mut self, names: I) -> &mut Self
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_mut().asc.extend(non_blank(names));
        self
    }

    /// Append descending sort keys.
    fn desc<I, S>(&mut self, names: I) -> &mut Self
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_mut().desc.extend(non_blank(names));
        self
    }

    /// 1-based page; `0` is read as `1`.
    fn page(&mut self, page: u64) -> &mut Self
    where
        Self: Sized,
    {
        self.state_mut().page = Some(page.max(1));
        self
    }

    /// Page size; `0` is read as the backend default.
    fn page_size(&mut self, size: u64) -> &mut Self
    where
        Self: Sized,
    {
        let size = if size == 0 { self.default_page_size() } else { size };
        self.state_mut().page_size = Some(size);
        self
    }

    /// Run the next terminal call against another table/collection/index.
    fn table(&mut self, name: impl Into<String>) -> &mut Self
    where
        Self: Sized,
    {
        self.state_mut().table = Some(name.into());
        self
    }

    /// Replace `out` with every matching entity, in backend order.
    fn find<T: Entity>(
        &mut self,
        out: &mut Vec<T>,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Alias of [`find`](Query::find).
    fn to_array<T: Entity>(
        &mut self,
        out: &mut Vec<T>,
    ) -> impl Future<Output = Result<(), DataError>> + Send
    where
        Self: Sized,
    {
        self.find(out)
    }

    /// Load the first match into `out`.
    ///
    /// Without a filter, a non-empty `out.id()` is used as an identity
    /// filter. When nothing matches, `out` is left untouched and `Ok(())`
    /// is returned.
    fn first<T: Entity>(
        &mut self,
        out: &mut T,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Number of rows matching the filter. Paging, ordering and projection
    /// are ignored.
    fn count<T: Entity>(&mut self) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Run a raw statement and bind its rows to `T` by column name.
    fn exec<T: Entity>(
        &mut self,
        out: &mut Vec<T>,
        statement: Self::Statement,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// One page of results plus the total count for the same filter.
    fn find_page<T: Entity>(&mut self) -> impl Future<Output = Result<Page<T>, DataError>> + Send
    where
        Self: Sized,
        Self::Filter: Clone,
    {
        async move {
            let default_size = self.default_page_size();
            let state = self.state_mut();
            if state.page.is_none() {
                state.page = Some(1);
            }
            let paging = state
                .paging(default_size)
                .unwrap_or(Paging::new(1, default_size, default_size));
            let filter = state.filter.clone();
            let table = state.table.clone();

            let mut content = Vec::new();
            self.find(&mut content).await?;

            let state = self.state_mut();
            state.filter = filter;
            state.table = table;
            let total = self.count::<T>().await?;
            Ok(Page::new(content, paging, total))
        }
    }
}
