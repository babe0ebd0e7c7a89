//! Files facade: project file reads and the roundtrip transaction protocol.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use fg_domain::command::{Command, FilesCommand, ListFiles, ReadFile};
use fg_domain::envelope::Outcome;
use fg_domain::error::{Error, Result};
use fg_tools::file_ops::normalize_path;
use fg_tools::roundtrip::fingerprint;
use fg_tools::TransactionManager;

use crate::registry::{CallContext, DomainHandler};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileContent {
    path: String,
    content: String,
    size: usize,
    fingerprint: String,
}

pub struct FilesHandler {
    transactions: Arc<TransactionManager>,
}

impl FilesHandler {
    pub fn new(transactions: Arc<TransactionManager>) -> Self {
        Self { transactions }
    }

    async fn read(&self, req: ReadFile) -> Result<Outcome> {
        let path = normalize_path(&req.path)?;
        let store = self.transactions.projects().open(&req.project_id)?;
        let bytes = store.read(&path).await?;
        let fingerprint = fingerprint(&bytes);
        let size = bytes.len();
        let content = String::from_utf8(bytes)
            .map_err(|_| Error::invalid(format!("'{path}' is not a UTF-8 text file")))?;
        Outcome::item(FileContent {
            path,
            content,
            size,
            fingerprint,
        })
    }

    async fn list(&self, req: ListFiles) -> Result<Outcome> {
        let dir = match req.path.as_deref() {
            None | Some("") | Some(".") => String::new(),
            Some(p) => normalize_path(p)?,
        };
        let store = self.transactions.projects().open(&req.project_id)?;
        Outcome::list(store.list(&dir).await?)
    }
}

#[async_trait]
impl DomainHandler for FilesHandler {
    async fn handle(&self, command: Command, _ctx: &CallContext) -> Result<Outcome> {
        let command = match command {
            Command::Files(c) => c,
            other => return Err(super::misrouted("files", &other)),
        };
        let tx = &self.transactions;
        match command {
            FilesCommand::Read(req) => self.read(req).await,
            FilesCommand::List(req) => self.list(req).await,
            FilesCommand::RoundtripStart(req) => {
                Outcome::item(tx.start(&req.project_id, &req.paths).await?)
            }
            FilesCommand::RoundtripPreview(req) => {
                Outcome::item(tx.preview(&req.manifest_id, &req.changes).await?)
            }
            FilesCommand::RoundtripCommit(req) => {
                Outcome::item(tx.commit(&req.manifest_id, req.changes, req.mode).await?)
            }
            FilesCommand::RoundtripStatus(req) => Outcome::item(tx.status(&req.manifest_id).await?),
            FilesCommand::RoundtripAbort(req) => Outcome::item(tx.abort(&req.manifest_id).await?),
        }
    }
}
