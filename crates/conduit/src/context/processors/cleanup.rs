use async_trait::async_trait;
use serde_json::Map;

use super::Processor;
use crate::context::{ContextError, PipelineContext};

/// Drops the stored-turn fields that have been folded into wire content, leaving
/// only what a backend receives.
pub struct MessageCleanup;

#[async_trait]
impl Processor for MessageCleanup {
    fn name(&self) -> &'static str {
        "MessageCleanup"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        for message in &mut context.messages {
            let stored = &mut message.message;
            stored.images.clear();
            stored.files.clear();
            stored.reasoning = None;
            stored.tools.clear();
            stored.plugin = None;
            stored.meta = Map::new();
        }
        context.set_flag("messagesCleaned");
        Ok(context)
    }
}
