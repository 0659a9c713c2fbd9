use bson::{Bson, Document};
use mongodb::{ClientSession, Database};
use strata_core::DataError;

use crate::error::MongoErrorExt;

/// A write against one collection, queued by a repository or executed
/// immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum MongoCommand {
    Insert {
        collection: String,
        document: Document,
    },
    Update {
        collection: String,
        filter: Document,
        update: Document,
        /// `update_many` instead of `update_one`.
        many: bool,
    },
    Delete {
        collection: String,
        filter: Document,
        many: bool,
    },
}

impl MongoCommand {
    pub fn collection(&self) -> &str {
        match self {
            MongoCommand::Insert { collection, .. }
            | MongoCommand::Update { collection, .. }
            | MongoCommand::Delete { collection, .. } => collection,
        }
    }

    pub fn operation(&self) -> String {
        match self {
            MongoCommand::Insert { collection, .. } => format!("insert into {collection}"),
            MongoCommand::Update { collection, .. } => format!("update {collection}"),
            MongoCommand::Delete { collection, .. } => format!("delete from {collection}"),
        }
    }

    /// Run the command, inside `session` when given. Returns the inserted
    /// id for inserts.
    pub(crate) async fn apply(
        &self,
        db: &Database,
        session: Option<&mut ClientSession>,
    ) -> Result<Option<Bson>, DataError> {
        let coll = db.collection::<Document>(self.collection());
        tracing::debug!(operation = %self.operation(), session = session.is_some(), "Executing Mongo command");

        let result = match (self, session) {
            (MongoCommand::Insert { document, .. }, Some(session)) => coll
                .insert_one_with_session(document, None, session)
                .await
                .map(|r| Some(r.inserted_id)),
            (MongoCommand::Insert { document, .. }, None) => coll
                .insert_one(document, None)
                .await
                .map(|r| Some(r.inserted_id)),
            (MongoCommand::Update { filter, update, many: false, .. }, Some(session)) => coll
                .update_one_with_session(filter.clone(), update.clone(), None, session)
                .await
                .map(|_| None),
            (MongoCommand::Update { filter, update, many: false, .. }, None) => coll
                .update_one(filter.clone(), update.clone(), None)
                .await
                .map(|_| None),
            (MongoCommand::Update { filter, update, many: true, .. }, Some(session)) => coll
                .update_many_with_session(filter.clone(), update.clone(), None, session)
                .await
                .map(|_| None),
            (MongoCommand::Update { filter, update, many: true, .. }, None) => coll
                .update_many(filter.clone(), update.clone(), None)
                .await
                .map(|_| None),
            (MongoCommand::Delete { filter, many: false, .. }, Some(session)) => coll
                .delete_one_with_session(filter.clone(), None, session)
                .await
                .map(|_| None),
            (MongoCommand::Delete { filter, many: false, .. }, None) => coll
                .delete_one(filter.clone(), None)
                .await
                .map(|_| None),
            (MongoCommand::Delete { filter, many: true, .. }, Some(session)) => coll
                .delete_many_with_session(filter.clone(), None, session)
                .await
                .map(|_| None),
            (MongoCommand::Delete { filter, many: true, .. }, None) => coll
                .delete_many(filter.clone(), None)
                .await
                .map(|_| None),
        };
        result.map_err(|e| e.context_error(self.operation()))
    }
}
