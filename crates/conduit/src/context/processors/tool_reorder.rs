use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::debug;

use super::Processor;
use crate::context::{ContextError, ContextMessage, PipelineContext};
use crate::models::message::Role;

/// Places every tool result right after the assistant turn that called it, in call
/// order. Results answering no known call keep their position.
pub struct ToolMessageReorder;

fn answered_call(message: &ContextMessage) -> Option<&str> {
    match message.role {
        Role::Tool => message.message.tool_call_id.as_deref(),
        _ => None,
    }
}

#[async_trait]
impl Processor for ToolMessageReorder {
    fn name(&self) -> &'static str {
        "ToolMessageReorder"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let call_ids: HashSet<String> = context
            .messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|call| call.id.clone()))
            .collect();
        if call_ids.is_empty() {
            return Ok(context);
        }

        let mut results: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, message) in context.messages.iter().enumerate() {
            if let Some(id) = answered_call(message).filter(|id| call_ids.contains(*id)) {
                results.entry(id.to_string()).or_default().push(index);
            }
        }

        let mut order = Vec::with_capacity(context.messages.len());
        for (index, message) in context.messages.iter().enumerate() {
            if answered_call(message).is_some_and(|id| call_ids.contains(id)) {
                continue;
            }
            order.push(index);
            for call in &message.tool_calls {
                if let Some(indices) = results.remove(&call.id) {
                    order.extend(indices);
                }
            }
        }

        if order.iter().copied().eq(0..context.messages.len()) {
            return Ok(context);
        }

        let mut slots: Vec<Option<ContextMessage>> =
            context.messages.drain(..).map(Some).collect();
        context.messages = order.into_iter().filter_map(|i| slots[i].take()).collect();
        debug!("moved tool results next to their calls");
        context.set_flag("toolMessagesReordered");
        Ok(context)
    }
}
