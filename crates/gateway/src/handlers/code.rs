//! Code facade: sandboxed `run` / `validate` and the language table.

use std::sync::Arc;

use async_trait::async_trait;

use fg_domain::command::{CodeCommand, Command};
use fg_domain::envelope::Outcome;
use fg_domain::error::{Error, Result};
use fg_sandbox::ExecutionOrchestrator;

use crate::registry::{CallContext, DomainHandler};

pub struct CodeHandler {
    orchestrator: Arc<ExecutionOrchestrator>,
}

impl CodeHandler {
    pub fn new(orchestrator: Arc<ExecutionOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl DomainHandler for CodeHandler {
    async fn handle(&self, command: Command, ctx: &CallContext) -> Result<Outcome> {
        let command = match command {
            Command::Code(c) => c,
            other => return Err(super::misrouted("code", &other)),
        };
        match command {
            CodeCommand::Run(req) => {
                let result = self.orchestrator.run(&req, &ctx.cancel).await?;
                if result.timed_out {
                    return Err(Error::Timeout(format!(
                        "{} execution on '{}' exceeded its deadline and was terminated after {} ms",
                        result.language, result.provider, result.execution_time_ms
                    )));
                }
                Outcome::item(result)
            }
            CodeCommand::Validate(req) => {
                Outcome::item(self.orchestrator.validate(&req, &ctx.cancel).await?)
            }
            CodeCommand::Languages(_) => Outcome::list(self.orchestrator.languages()),
        }
    }
}
