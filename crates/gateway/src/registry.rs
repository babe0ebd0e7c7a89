//! Domain registry: which handler serves which facade, and whether it is on.
//!
//! Built once during bootstrap and read-only afterwards, so lookups take no
//! locks.  Tests build their own registries with fake handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use fg_domain::command::{Command, Domain};
use fg_domain::envelope::{Detail, Outcome};
use fg_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-call information a handler may need besides the command itself.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Opaque caller identity; used as a key, never interpreted.
    pub caller: String,
    pub detail: Detail,
    /// Cancelled when the caller goes away.
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new(caller: impl Into<String>, detail: Detail) -> Self {
        Self {
            caller: caller.into(),
            detail,
            cancel: CancellationToken::new(),
        }
    }
}

/// A domain facade.  Returns a result or a typed failure; never builds the
/// response envelope.
#[async_trait]
pub trait DomainHandler: Send + Sync {
    async fn handle(&self, command: Command, ctx: &CallContext) -> Result<Outcome>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct Registered {
    pub domain: Domain,
    pub handler: Arc<dyn DomainHandler>,
    pub enabled: bool,
}

/// Summary row for `GET /v1/domains`.
#[derive(Debug, Clone, Serialize)]
pub struct DomainInfo {
    pub name: &'static str,
    pub enabled: bool,
    pub commands: &'static [&'static str],
}

#[derive(Default)]
pub struct DomainRegistry {
    entries: BTreeMap<Domain, Registered>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `domain`.
    pub fn register(&mut self, domain: Domain, handler: Arc<dyn DomainHandler>, enabled: bool) {
        if !enabled {
            tracing::info!(domain = %domain, "domain registered but disabled");
        }
        self.entries.insert(
            domain,
            Registered {
                domain,
                handler,
                enabled,
            },
        );
    }

    /// Look up a facade by its public name.  Disabled domains still resolve.
    pub fn resolve(&self, name: &str) -> Result<&Registered> {
        let domain: Domain = name.parse()?;
        self.entries
            .get(&domain)
            .ok_or_else(|| Error::not_found(format!("unknown domain '{name}'")))
    }

    pub fn is_enabled(&self, domain: Domain) -> bool {
        self.entries.get(&domain).is_some_and(|r| r.enabled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn domains(&self) -> Vec<DomainInfo> {
        self.entries
            .values()
            .map(|r| DomainInfo {
                name: r.domain.as_str(),
                enabled: r.enabled,
                commands: r.domain.commands(),
            })
            .collect()
    }
}
