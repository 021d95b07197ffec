use async_trait::async_trait;

use super::Processor;
use crate::context::{ContextError, PipelineContext};

/// Puts the agent's system role at the head of the conversation
pub struct SystemRoleInjector {
    system_role: Option<String>,
}

impl SystemRoleInjector {
    pub fn new(system_role: Option<String>) -> Self {
        Self { system_role }
    }
}

#[async_trait]
impl Processor for SystemRoleInjector {
    fn name(&self) -> &'static str {
        "SystemRoleInjector"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let Some(system_role) = self.system_role.as_deref().filter(|s| !s.trim().is_empty())
        else {
            return Ok(context);
        };

        context.inject_system_content(system_role);
        context.set_flag("systemRoleInjected");
        Ok(context)
    }
}
