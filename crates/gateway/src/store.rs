//! Record storage collaborator for the CRUD facades.
//!
//! Memories, knowledge, projects and conversations are plain records in a
//! named collection.  Persistence lives behind [`RecordStore`]; the gateway
//! ships an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};

use fg_domain::command::{CreateRecord, Domain, ListRecords, UpdateRecord};
use fg_domain::envelope::Detail;
use fg_domain::error::{Error, Result};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 500;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub collection: Domain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: Value,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    seq: u64,
}

impl Record {
    /// Shape the record for the requested detail level.
    ///
    /// `minimal` keeps id + title, `standard` replaces the message log with
    /// its length, `full` returns everything.
    pub fn render(&self, detail: Detail) -> Value {
        match detail {
            Detail::Minimal => json!({ "id": self.id, "title": self.title }),
            Detail::Standard => {
                let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.remove("messages");
                    if self.collection == Domain::Conversations {
                        map.insert("messageCount".into(), json!(self.messages.len()));
                    }
                }
                value
            }
            Detail::Full => serde_json::to_value(self).unwrap_or(Value::Null),
        }
    }

    /// Case-insensitive substring match over title, tags and content.
    pub fn matches(&self, needle_lower: &str) -> bool {
        let in_title = self
            .title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(needle_lower));
        let in_tags = self
            .tags
            .iter()
            .any(|t| t.to_lowercase().contains(needle_lower));
        let in_content = match &self.content {
            Value::String(s) => s.to_lowercase().contains(needle_lower),
            other => other.to_string().to_lowercase().contains(needle_lower),
        };
        in_title || in_tags || in_content
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collaborator trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, collection: Domain, draft: CreateRecord) -> Result<Record>;
    async fn get(&self, collection: Domain, id: &str) -> Result<Record>;
    /// Newest first.
    async fn list(&self, collection: Domain, filter: &ListRecords) -> Result<Vec<Record>>;
    async fn update(&self, collection: Domain, patch: UpdateRecord) -> Result<Record>;
    async fn delete(&self, collection: Domain, id: &str) -> Result<()>;
    async fn append_message(&self, collection: Domain, id: &str, role: &str, content: &str)
        -> Result<Record>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct Collections {
    records: HashMap<Domain, HashMap<String, Record>>,
    next_seq: u64,
}

#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Collections>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_not_found(collection: Domain, id: &str) -> Error {
    Error::not_found(format!("{collection} record '{id}' not found"))
}

fn clamp_limit(limit: Option<usize>) -> Result<usize> {
    match limit {
        Some(0) => Err(Error::invalid("limit must be greater than 0")),
        Some(n) => Ok(n.min(MAX_LIST_LIMIT)),
        None => Ok(DEFAULT_LIST_LIMIT),
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, collection: Domain, draft: CreateRecord) -> Result<Record> {
        if draft.content.is_null() {
            return Err(Error::invalid("content must not be null"));
        }
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner.next_seq += 1;
        let record = Record {
            id: uuid::Uuid::new_v4().to_string(),
            collection,
            title: draft.title,
            content: draft.content,
            tags: draft.tags,
            project_id: draft.project_id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            seq: inner.next_seq,
        };
        inner
            .records
            .entry(collection)
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, collection: Domain, id: &str) -> Result<Record> {
        self.inner
            .read()
            .records
            .get(&collection)
            .and_then(|c| c.get(id))
            .cloned()
            .ok_or_else(|| record_not_found(collection, id))
    }

    async fn list(&self, collection: Domain, filter: &ListRecords) -> Result<Vec<Record>> {
        let limit = clamp_limit(filter.limit)?;
        let offset = filter.offset.unwrap_or(0);

        let inner = self.inner.read();
        let mut records: Vec<&Record> = inner
            .records
            .get(&collection)
            .map(|c| c.values().collect())
            .unwrap_or_default();
        if let Some(project_id) = &filter.project_id {
            records.retain(|r| r.project_id.as_deref() == Some(project_id.as_str()));
        }
        records.sort_by(|a, b| b.seq.cmp(&a.seq));

        Ok(records
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, collection: Domain, patch: UpdateRecord) -> Result<Record> {
        if patch.content.as_ref().is_some_and(Value::is_null) {
            return Err(Error::invalid("content must not be null"));
        }
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(&collection)
            .and_then(|c| c.get_mut(&patch.id))
            .ok_or_else(|| record_not_found(collection, &patch.id))?;

        if let Some(title) = patch.title {
            record.title = Some(title);
        }
        if let Some(content) = patch.content {
            record.content = content;
        }
        if let Some(tags) = patch.tags {
            record.tags = tags;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, collection: Domain, id: &str) -> Result<()> {
        self.inner
            .write()
            .records
            .get_mut(&collection)
            .and_then(|c| c.remove(id))
            .map(|_| ())
            .ok_or_else(|| record_not_found(collection, id))
    }

    async fn append_message(
        &self,
        collection: Domain,
        id: &str,
        role: &str,
        content: &str,
    ) -> Result<Record> {
        if role.trim().is_empty() {
            return Err(Error::invalid("role must not be empty"));
        }
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(&collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| record_not_found(collection, id))?;
        let now = Utc::now();
        record.messages.push(Message {
            role: role.to_string(),
            content: content.to_string(),
            at: now,
        });
        record.updated_at = now;
        Ok(record.clone())
    }
}
