use std::sync::Arc;

use async_trait::async_trait;

use super::Processor;
use crate::context::{ContextError, PipelineContext};
use crate::model_bank::ModelCapabilities;
use crate::models::message::Role;
use crate::models::tool::ToolCall;

/// Builds the function name a backend sees from `(identifier, api_name, type)`
pub type ToolNameFn = Arc<dyn Fn(&str, &str, &str) -> String + Send + Sync>;

/// Turns recorded tool invocations into wire tool calls.
///
/// Models without function calling get neither: invocations are dropped and tool
/// results are sent as ordinary user turns.
pub struct ToolCallProcessor {
    capabilities: Arc<dyn ModelCapabilities>,
    name_fn: ToolNameFn,
}

impl ToolCallProcessor {
    pub fn new(capabilities: Arc<dyn ModelCapabilities>, name_fn: ToolNameFn) -> Self {
        Self {
            capabilities,
            name_fn,
        }
    }
}

#[async_trait]
impl Processor for ToolCallProcessor {
    fn name(&self) -> &'static str {
        "ToolCallProcessor"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let function_call = self
            .capabilities
            .can_use_function_call(context.model(), context.provider());

        let mut converted = 0;
        for message in &mut context.messages {
            match message.role {
                Role::Assistant if function_call => {
                    message.tool_calls = message
                        .message
                        .tools
                        .iter()
                        .map(|invocation| {
                            ToolCall::new(
                                invocation.id.clone(),
                                (self.name_fn)(
                                    &invocation.identifier,
                                    &invocation.api_name,
                                    &invocation.kind,
                                ),
                                invocation.arguments.clone(),
                            )
                        })
                        .collect();
                    converted += message.tool_calls.len() as u64;
                }
                Role::Tool if function_call => {
                    message.name = message.message.plugin.as_ref().map(|plugin| {
                        (self.name_fn)(&plugin.identifier, &plugin.api_name, &plugin.kind)
                    });
                }
                Role::Tool => message.role = Role::User,
                _ => {}
            }
        }

        context.add_to_counter("toolCallsProcessed", converted);
        Ok(context)
    }
}
