//! Hydration facade: one call that primes a client with a project's context.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use fg_domain::command::{Command, Domain, Hydrate, HydrationCommand, ListRecords};
use fg_domain::envelope::Outcome;
use fg_domain::error::Result;

use crate::registry::{CallContext, DomainHandler};
use crate::store::RecordStore;

const DEFAULT_RECENT: usize = 10;

pub struct HydrationHandler {
    store: Arc<dyn RecordStore>,
}

impl HydrationHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn hydrate(&self, req: Hydrate, ctx: &CallContext) -> Result<Outcome> {
        let project = self.store.get(Domain::Projects, &req.project_id).await?;
        let filter = ListRecords {
            limit: Some(req.limit.unwrap_or(DEFAULT_RECENT)),
            offset: None,
            project_id: Some(req.project_id.clone()),
        };

        let render = |records: Vec<crate::store::Record>| -> Vec<Value> {
            records.iter().map(|r| r.render(ctx.detail)).collect()
        };
        let memories = render(self.store.list(Domain::Memories, &filter).await?);
        let knowledge = render(self.store.list(Domain::Knowledge, &filter).await?);

        Outcome::item(json!({
            "project": project.render(ctx.detail),
            "memories": memories,
            "knowledge": knowledge,
        }))
    }
}

#[async_trait]
impl DomainHandler for HydrationHandler {
    async fn handle(&self, command: Command, ctx: &CallContext) -> Result<Outcome> {
        match command {
            Command::Hydration(HydrationCommand::Hydrate(req)) => self.hydrate(req, ctx).await,
            other => Err(super::misrouted("hydration", &other)),
        }
    }
}
