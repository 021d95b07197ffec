use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::Processor;
use crate::context::prompts::tools_system_roles;
use crate::context::{ContextError, PipelineContext};
use crate::model_bank::ModelCapabilities;
use crate::models::tool::ToolManifest;

/// Adds instructions of the enabled tools when the model can call functions
pub struct ToolSystemRoleProvider {
    tools: Vec<ToolManifest>,
    capabilities: Arc<dyn ModelCapabilities>,
}

impl ToolSystemRoleProvider {
    pub fn new(tools: Vec<ToolManifest>, capabilities: Arc<dyn ModelCapabilities>) -> Self {
        Self {
            tools,
            capabilities,
        }
    }
}

#[async_trait]
impl Processor for ToolSystemRoleProvider {
    fn name(&self) -> &'static str {
        "ToolSystemRoleProvider"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        if self.tools.is_empty()
            || !self
                .capabilities
                .can_use_function_call(context.model(), context.provider())
        {
            return Ok(context);
        }

        let system_roles = tools_system_roles(&self.tools).map_err(|e| {
            warn!(error = %e, "failed to render tool instructions");
            ContextError::Processor {
                processor: "ToolSystemRoleProvider",
                message: e.to_string(),
            }
        })?;

        if let Some(system_roles) = system_roles {
            context.inject_system_content(&system_roles);
            context.set_flag("toolSystemRoleInjected");
        }
        Ok(context)
    }
}
