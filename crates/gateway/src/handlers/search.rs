//! Search facade: substring lookup across record collections.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use fg_domain::command::{Command, Domain, ListRecords, SearchCommand, SearchQuery};
use fg_domain::envelope::Outcome;
use fg_domain::error::{Error, Result};

use crate::registry::{CallContext, DomainHandler};
use crate::store::{RecordStore, MAX_LIST_LIMIT};

const DEFAULT_HITS: usize = 20;

#[derive(Debug, Serialize)]
struct Hit {
    domain: Domain,
    record: Value,
}

pub struct SearchHandler {
    store: Arc<dyn RecordStore>,
}

impl SearchHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn query(&self, req: SearchQuery, ctx: &CallContext) -> Result<Outcome> {
        let needle = req.query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::invalid("query must not be empty"));
        }
        let limit = req.limit.unwrap_or(DEFAULT_HITS).clamp(1, MAX_LIST_LIMIT);
        let domains = req
            .domains
            .unwrap_or_else(|| vec![Domain::Memories, Domain::Knowledge]);
        if let Some(bad) = domains.iter().find(|d| !is_record_domain(**d)) {
            return Err(Error::invalid(format!("'{bad}' is not a searchable collection")));
        }

        let filter = ListRecords {
            limit: Some(MAX_LIST_LIMIT),
            offset: None,
            project_id: req.project_id,
        };
        let mut hits = Vec::new();
        for domain in domains {
            for record in self.store.list(domain, &filter).await? {
                if record.matches(&needle) {
                    hits.push(Hit {
                        domain,
                        record: record.render(ctx.detail),
                    });
                    if hits.len() == limit {
                        return Outcome::list(hits);
                    }
                }
            }
        }
        Outcome::list(hits)
    }
}

fn is_record_domain(domain: Domain) -> bool {
    matches!(
        domain,
        Domain::Memories | Domain::Knowledge | Domain::Projects | Domain::Conversations
    )
}

#[async_trait]
impl DomainHandler for SearchHandler {
    async fn handle(&self, command: Command, ctx: &CallContext) -> Result<Outcome> {
        match command {
            Command::Search(SearchCommand::Query(req)) => self.query(req, ctx).await,
            other => Err(super::misrouted("search", &other)),
        }
    }
}
