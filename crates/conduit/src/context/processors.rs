//! The processors making up the default context pipeline, in the order they run:
//!
//! 1. [`HistoryTruncator`] drops old turns, before anything is injected
//! 2. [`SystemRoleInjector`] adds the agent's system role
//! 3. [`GuideProvider`] adds onboarding guidance for the inbox welcome question
//! 4. [`ToolSystemRoleProvider`] adds instructions of enabled tools
//! 5. [`HistorySummaryProvider`] adds the summary of truncated history
//! 6. [`InputTemplateProcessor`] wraps the latest user turn in the input template
//! 7. [`PlaceholderVariablesProcessor`] expands `{{variable}}` placeholders
//! 8. [`MessageContentProcessor`] derives wire content from text and attachments
//! 9. [`ToolCallProcessor`] converts tool invocations to wire tool calls
//! 10. [`ToolMessageReorder`] moves tool results next to the call they answer
//! 11. [`MessageCleanup`] strips everything backends must not receive
mod cleanup;
mod guide;
mod history_summary;
mod input_template;
mod message_content;
mod placeholder;
mod system_role;
mod tool_call;
mod tool_reorder;
mod tool_system_role;
mod truncate;

use async_trait::async_trait;

use super::{ContextError, PipelineContext};

pub use cleanup::MessageCleanup;
pub use guide::GuideProvider;
pub use history_summary::HistorySummaryProvider;
pub use input_template::InputTemplateProcessor;
pub use message_content::{FileContextConfig, MessageContentProcessor};
pub use placeholder::{default_variable_generators, PlaceholderVariablesProcessor, VariableGenerator};
pub use system_role::SystemRoleInjector;
pub use tool_call::{ToolCallProcessor, ToolNameFn};
pub use tool_reorder::ToolMessageReorder;
pub use tool_system_role::ToolSystemRoleProvider;
pub use truncate::HistoryTruncator;

/// One stage of the context pipeline.
///
/// A processor owns the context while it runs and hands it on. Implementations provide
/// `transform`; `process` skips it once the run has been aborted.
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transform(&self, context: PipelineContext) -> Result<PipelineContext, ContextError>;

    async fn process(&self, context: PipelineContext) -> Result<PipelineContext, ContextError> {
        if context.is_aborted {
            return Ok(context);
        }
        self.transform(context).await
    }
}
