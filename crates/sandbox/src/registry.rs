//! Provider registry.
//!
//! Instantiates every configured sandbox provider once at startup and keeps
//! them sorted by priority.  Read-only afterwards.

use std::sync::Arc;
use std::time::Duration;

use fg_domain::config::{ExecutionConfig, ProviderConfig, ProviderKind};
use fg_domain::error::Result;

use crate::container::ContainerProvider;
use crate::language;
use crate::managed::ManagedProvider;
use crate::provider::{ProviderDescriptor, SandboxProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProviderRegistry {
    /// Ascending priority; ties broken by name.
    providers: Vec<Arc<dyn SandboxProvider>>,
}

/// Canonicalize configured language names, dropping unknown ones.
fn descriptor_from_config(pc: &ProviderConfig) -> ProviderDescriptor {
    let mut languages = Vec::new();
    for name in &pc.languages {
        match language::lookup(name) {
            Some(lang) if !languages.iter().any(|l| l == lang.id) => {
                languages.push(lang.id.to_string());
            }
            Some(_) => {}
            None => {
                tracing::warn!(
                    provider = %pc.name,
                    language = %name,
                    "unknown language in provider config, ignoring"
                );
            }
        }
    }
    ProviderDescriptor {
        name: pc.name.clone(),
        priority: pc.priority,
        languages,
        default_timeout: pc.default_timeout_secs.map(Duration::from_secs),
    }
}

impl ProviderRegistry {
    /// Build from already-constructed providers (tests, embedding).
    pub fn new(mut providers: Vec<Arc<dyn SandboxProvider>>) -> Self {
        providers.sort_by(|a, b| {
            let (a, b) = (a.descriptor(), b.descriptor());
            a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name))
        });
        Self { providers }
    }

    /// Build the registry from `[execution]` config.
    ///
    /// Providers that fail to initialize (e.g. a managed provider whose API
    /// key variable is unset) are logged and skipped rather than aborting
    /// startup.
    pub fn from_config(config: &ExecutionConfig) -> Result<Self> {
        let mut providers: Vec<Arc<dyn SandboxProvider>> = Vec::new();

        for pc in &config.providers {
            let descriptor = descriptor_from_config(pc);
            let result: Result<Arc<dyn SandboxProvider>> = match pc.kind {
                ProviderKind::Container => Ok(Arc::new(ContainerProvider::from_config(
                    descriptor, pc, config,
                ))),
                ProviderKind::Managed => ManagedProvider::from_config(descriptor, pc)
                    .map(|p| Arc::new(p) as Arc<dyn SandboxProvider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(
                        provider = %pc.name,
                        kind = ?pc.kind,
                        priority = pc.priority,
                        languages = ?provider.descriptor().languages,
                        "registered sandbox provider"
                    );
                    providers.push(provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %pc.name,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize sandbox provider, skipping"
                    );
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            tracing::warn!("no sandbox providers initialized; code execution will fail");
        }

        Ok(Self::new(providers))
    }

    /// Providers supporting `language_id`, in the order they should be tried.
    pub fn candidates(&self, language_id: &str) -> Vec<Arc<dyn SandboxProvider>> {
        self.providers
            .iter()
            .filter(|p| p.descriptor().supports(language_id))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SandboxProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in priority order.
    pub fn list_providers(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.descriptor().name.clone())
            .collect()
    }
}
