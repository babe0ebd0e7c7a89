//! CRUD facades: memories, knowledge, projects and conversations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use fg_domain::command::{Command, ConversationCommand, Domain, RecordCommand};
use fg_domain::envelope::{Detail, Outcome};
use fg_domain::error::Result;

use crate::registry::{CallContext, DomainHandler};
use crate::store::RecordStore;

/// One handler instance serves every record-shaped domain; the collection
/// comes from the command's domain.
pub struct RecordsHandler {
    store: Arc<dyn RecordStore>,
}

impl RecordsHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn crud(&self, collection: Domain, command: RecordCommand, detail: Detail) -> Result<Outcome> {
        let store = &self.store;
        match command {
            RecordCommand::Create(draft) => {
                let record = store.create(collection, draft).await?;
                tracing::debug!(collection = %collection, id = %record.id, "record created");
                Outcome::item(record.render(detail))
            }
            RecordCommand::Get(req) => Outcome::item(store.get(collection, &req.id).await?.render(detail)),
            RecordCommand::List(filter) => {
                let records = store.list(collection, &filter).await?;
                Outcome::list(records.iter().map(|r| r.render(detail)).collect())
            }
            RecordCommand::Update(patch) => {
                Outcome::item(store.update(collection, patch).await?.render(detail))
            }
            RecordCommand::Delete(req) => {
                store.delete(collection, &req.id).await?;
                Outcome::item(json!({ "id": req.id, "deleted": true }))
            }
        }
    }
}

#[async_trait]
impl DomainHandler for RecordsHandler {
    async fn handle(&self, command: Command, ctx: &CallContext) -> Result<Outcome> {
        let detail = ctx.detail;
        match command {
            Command::Memories(c) => self.crud(Domain::Memories, c, detail).await,
            Command::Knowledge(c) => self.crud(Domain::Knowledge, c, detail).await,
            Command::Projects(c) => self.crud(Domain::Projects, c, detail).await,
            Command::Conversations(c) => {
                let collection = Domain::Conversations;
                let crud = match c {
                    ConversationCommand::Append(msg) => {
                        let record = self
                            .store
                            .append_message(collection, &msg.id, &msg.role, &msg.content)
                            .await?;
                        return Outcome::item(record.render(detail));
                    }
                    ConversationCommand::Create(d) => RecordCommand::Create(d),
                    ConversationCommand::Get(r) => RecordCommand::Get(r),
                    ConversationCommand::List(l) => RecordCommand::List(l),
                    ConversationCommand::Update(u) => RecordCommand::Update(u),
                    ConversationCommand::Delete(r) => RecordCommand::Delete(r),
                };
                self.crud(collection, crud, detail).await
            }
            other => Err(super::misrouted("records", &other)),
        }
    }
}
