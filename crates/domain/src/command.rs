//! Typed command variants, one closed enum per domain facade.
//!
//! The wire envelope carries `cmd` + a loose `params` map.  [`Command::parse`]
//! turns that pair into exactly one strongly-typed variant, rejecting unknown
//! commands with `NotFound` and malformed params with `InvalidInput` before
//! any handler runs.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Domains
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Memories,
    Knowledge,
    Files,
    Code,
    Conversations,
    Hydration,
    Search,
    Projects,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Memories,
        Domain::Knowledge,
        Domain::Files,
        Domain::Code,
        Domain::Conversations,
        Domain::Hydration,
        Domain::Search,
        Domain::Projects,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Memories => "memories",
            Domain::Knowledge => "knowledge",
            Domain::Files => "files",
            Domain::Code => "code",
            Domain::Conversations => "conversations",
            Domain::Hydration => "hydration",
            Domain::Search => "search",
            Domain::Projects => "projects",
        }
    }

    /// Command names accepted by this domain.
    pub fn commands(self) -> &'static [&'static str] {
        match self {
            Domain::Memories | Domain::Knowledge | Domain::Projects => RecordCommand::NAMES,
            Domain::Conversations => ConversationCommand::NAMES,
            Domain::Files => FilesCommand::NAMES,
            Domain::Code => CodeCommand::NAMES,
            Domain::Hydration => HydrationCommand::NAMES,
            Domain::Search => SearchCommand::NAMES,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::not_found(format!("unknown domain '{s}'")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Implemented by every per-domain command enum.
pub trait DomainCommand: DeserializeOwned {
    const NAMES: &'static [&'static str];

    fn parse(cmd: &str, params: Map<String, Value>) -> Result<Self> {
        if !Self::NAMES.contains(&cmd) {
            return Err(Error::not_found(format!("unknown command '{cmd}'")));
        }
        let tagged = serde_json::json!({ "cmd": cmd, "params": Value::Object(params) });
        serde_json::from_value(tagged)
            .map_err(|e| Error::invalid(format!("invalid params for '{cmd}': {e}")))
    }
}

/// A fully-typed command, bound to its domain.
#[derive(Debug, Clone)]
pub enum Command {
    Memories(RecordCommand),
    Knowledge(RecordCommand),
    Projects(RecordCommand),
    Conversations(ConversationCommand),
    Files(FilesCommand),
    Code(CodeCommand),
    Hydration(HydrationCommand),
    Search(SearchCommand),
}

impl Command {
    pub fn parse(domain: Domain, cmd: &str, params: Option<Map<String, Value>>) -> Result<Self> {
        if cmd.trim().is_empty() {
            return Err(Error::invalid("cmd must not be empty"));
        }
        let params = params.unwrap_or_default();
        Ok(match domain {
            Domain::Memories => Command::Memories(RecordCommand::parse(cmd, params)?),
            Domain::Knowledge => Command::Knowledge(RecordCommand::parse(cmd, params)?),
            Domain::Projects => Command::Projects(RecordCommand::parse(cmd, params)?),
            Domain::Conversations => {
                Command::Conversations(ConversationCommand::parse(cmd, params)?)
            }
            Domain::Files => Command::Files(FilesCommand::parse(cmd, params)?),
            Domain::Code => Command::Code(CodeCommand::parse(cmd, params)?),
            Domain::Hydration => Command::Hydration(HydrationCommand::parse(cmd, params)?),
            Domain::Search => Command::Search(SearchCommand::parse(cmd, params)?),
        })
    }

    pub fn domain(&self) -> Domain {
        match self {
            Command::Memories(_) => Domain::Memories,
            Command::Knowledge(_) => Domain::Knowledge,
            Command::Projects(_) => Domain::Projects,
            Command::Conversations(_) => Domain::Conversations,
            Command::Files(_) => Domain::Files,
            Command::Code(_) => Domain::Code,
            Command::Hydration(_) => Domain::Hydration,
            Command::Search(_) => Domain::Search,
        }
    }
}

/// Params for commands that take none.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoParams {}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Record-shaped domains (memories, knowledge, projects)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum RecordCommand {
    Create(CreateRecord),
    Get(RecordId),
    List(ListRecords),
    Update(UpdateRecord),
    Delete(RecordId),
}

impl DomainCommand for RecordCommand {
    const NAMES: &'static [&'static str] = &["create", "get", "list", "update", "delete"];
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecord {
    #[serde(default)]
    pub title: Option<String>,
    pub content: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordId {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecords {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum ConversationCommand {
    Create(CreateRecord),
    Get(RecordId),
    List(ListRecords),
    Update(UpdateRecord),
    Delete(RecordId),
    Append(AppendMessage),
}

impl DomainCommand for ConversationCommand {
    const NAMES: &'static [&'static str] =
        &["create", "get", "list", "update", "delete", "append"];
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppendMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum FilesCommand {
    Read(ReadFile),
    List(ListFiles),
    RoundtripStart(RoundtripStart),
    RoundtripPreview(RoundtripPreview),
    RoundtripCommit(RoundtripCommit),
    RoundtripStatus(ManifestRef),
    RoundtripAbort(ManifestRef),
}

impl DomainCommand for FilesCommand {
    const NAMES: &'static [&'static str] = &[
        "read",
        "list",
        "roundtrip_start",
        "roundtrip_preview",
        "roundtrip_commit",
        "roundtrip_status",
        "roundtrip_abort",
    ];
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFile {
    pub project_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFiles {
    pub project_id: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundtripStart {
    pub project_id: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundtripPreview {
    pub manifest_id: String,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundtripCommit {
    pub manifest_id: String,
    pub changes: Vec<Change>,
    pub mode: CommitMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRef {
    pub manifest_id: String,
}

/// One staged edit inside a roundtrip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum Change {
    Replace { path: String, content: String },
    /// `diff` is a unified diff against the file's current content.
    Patch { path: String, diff: String },
    Delete { path: String },
}

impl Change {
    pub fn path(&self) -> &str {
        match self {
            Change::Replace { path, .. } | Change::Patch { path, .. } | Change::Delete { path } => {
                path
            }
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Change::Replace { .. } => "replace",
            Change::Patch { .. } => "patch",
            Change::Delete { .. } => "delete",
        }
    }
}

/// Write semantics for a commit.  Only overwrite is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    Replace,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Code
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum CodeCommand {
    Run(RunCode),
    Validate(ValidateCode),
    Languages(NoParams),
}

impl DomainCommand for CodeCommand {
    const NAMES: &'static [&'static str] = &["run", "validate", "languages"];
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunCode {
    pub language: String,
    pub code: String,
    /// Seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub stdin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateCode {
    pub language: String,
    pub code: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search / hydration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum SearchCommand {
    Query(SearchQuery),
}

impl DomainCommand for SearchCommand {
    const NAMES: &'static [&'static str] = &["query"];
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Collections to search; defaults to memories + knowledge.
    #[serde(default)]
    pub domains: Option<Vec<Domain>>,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum HydrationCommand {
    Hydrate(Hydrate),
}

impl DomainCommand for HydrationCommand {
    const NAMES: &'static [&'static str] = &["hydrate"];
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hydrate {
    pub project_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn params(v: Value) -> Option<Map<String, Value>> {
        match v {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    #[test]
    fn parses_roundtrip_commit_with_typed_changes() {
        let cmd = Command::parse(
            Domain::Files,
            "roundtrip_commit",
            params(json!({
                "manifestId": "m1",
                "mode": "replace",
                "changes": [
                    {"path": "a.txt", "operation": "replace", "content": "new"},
                    {"path": "b.txt", "operation": "delete"}
                ]
            })),
        )
        .unwrap();
        match cmd {
            Command::Files(FilesCommand::RoundtripCommit(c)) => {
                assert_eq!(c.manifest_id, "m1");
                assert_eq!(c.mode, CommitMode::Replace);
                assert_eq!(c.changes.len(), 2);
                assert_eq!(c.changes[1], Change::Delete { path: "b.txt".into() });
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_not_found() {
        let err = Command::parse(Domain::Code, "compile", None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn missing_required_param_is_invalid_input() {
        let err = Command::parse(Domain::Code, "run", params(json!({"language": "python"})))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn empty_cmd_is_invalid_input() {
        let err = Command::parse(Domain::Files, "  ", None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn commands_without_params_accept_missing_map() {
        let cmd = Command::parse(Domain::Code, "languages", None).unwrap();
        assert!(matches!(cmd, Command::Code(CodeCommand::Languages(_))));
    }

    #[test]
    fn unsupported_commit_mode_is_rejected() {
        let err = Command::parse(
            Domain::Files,
            "roundtrip_commit",
            params(json!({"manifestId": "m", "changes": [], "mode": "merge"})),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn domain_from_str_roundtrips() {
        for d in Domain::ALL {
            assert_eq!(d.as_str().parse::<Domain>().unwrap(), d);
        }
        assert!("billing".parse::<Domain>().is_err());
    }
}
