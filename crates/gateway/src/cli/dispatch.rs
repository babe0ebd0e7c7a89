//! `facadegw dispatch`: run one envelope through the full dispatcher without
//! starting the HTTP listener.

use std::sync::Arc;

use fg_domain::config::Config;

use crate::bootstrap;

/// Returns whether the response envelope was `ok`.
pub async fn run(config: Config, domain: &str, envelope: &str, caller: &str) -> anyhow::Result<bool> {
    let state = bootstrap::build_app_state(Arc::new(config))?;
    let dispatched = state
        .dispatcher
        .dispatch_json(domain, envelope.as_bytes(), caller)
        .await;
    println!("{}", serde_json::to_string_pretty(&dispatched.response)?);
    Ok(dispatched.is_ok())
}
