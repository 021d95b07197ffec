use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::engine::ContextEngine;
use super::processors::{
    default_variable_generators, FileContextConfig, GuideProvider, HistorySummaryProvider,
    HistoryTruncator, InputTemplateProcessor, MessageCleanup, MessageContentProcessor,
    PlaceholderVariablesProcessor, Processor, SystemRoleInjector, ToolCallProcessor,
    ToolMessageReorder, ToolNameFn, ToolSystemRoleProvider, VariableGenerator,
};
use super::{ContextError, InitialState, PipelineContext};
use crate::image::ImageFetcher;
use crate::model_bank::ModelCapabilities;
use crate::models::message::{Message, WireMessage};
use crate::models::tool::{tool_calling_name, ToolManifest};
use crate::token_counter::TokenCounter;

/// Everything one chat turn brings to context assembly
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssemblyRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub provider: String,
    pub system_role: Option<String>,
    pub input_template: Option<String>,
    pub tools: Vec<ToolManifest>,
    pub enable_history_count: bool,
    pub history_count: Option<usize>,
    pub history_summary: Option<String>,
    pub session_id: Option<String>,
    pub is_welcome_question: bool,
    /// Upper bound on history tokens, counted before anything is injected
    pub token_budget: Option<usize>,
}

/// Builds and runs the context pipeline for each request.
///
/// Holds the collaborators shared across requests: capability predicates, the image
/// fetcher, placeholder generators and the tool naming function.
pub struct ContextAssembler {
    capabilities: Arc<dyn ModelCapabilities>,
    image_fetcher: Arc<dyn ImageFetcher>,
    file_context: FileContextConfig,
    generators: HashMap<String, VariableGenerator>,
    token_counter: Arc<TokenCounter>,
    tool_name_fn: ToolNameFn,
}

impl ContextAssembler {
    pub fn new(
        capabilities: Arc<dyn ModelCapabilities>,
        image_fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            capabilities,
            image_fetcher,
            file_context: FileContextConfig::default(),
            generators: default_variable_generators(),
            token_counter: Arc::new(TokenCounter::new()),
            tool_name_fn: Arc::new(tool_calling_name),
        }
    }

    pub fn with_file_context(mut self, file_context: FileContextConfig) -> Self {
        self.file_context = file_context;
        self
    }

    /// Replace the placeholder generators
    pub fn with_generators(mut self, generators: HashMap<String, VariableGenerator>) -> Self {
        self.generators = generators;
        self
    }

    pub fn with_tool_name_fn(mut self, tool_name_fn: ToolNameFn) -> Self {
        self.tool_name_fn = tool_name_fn;
        self
    }

    /// The pipeline for one request, stages in their fixed order
    pub fn engine(&self, request: &AssemblyRequest) -> ContextEngine {
        let mut truncator =
            HistoryTruncator::new(request.enable_history_count, request.history_count);
        if let Some(budget) = request.token_budget {
            truncator = truncator.with_token_budget(budget, self.token_counter.clone());
        }

        let processors: Vec<Box<dyn Processor>> = vec![
            Box::new(truncator),
            Box::new(SystemRoleInjector::new(request.system_role.clone())),
            Box::new(GuideProvider::new(
                request.session_id.clone(),
                request.is_welcome_question,
            )),
            Box::new(ToolSystemRoleProvider::new(
                request.tools.clone(),
                self.capabilities.clone(),
            )),
            Box::new(HistorySummaryProvider::new(request.history_summary.clone())),
            Box::new(InputTemplateProcessor::new(request.input_template.clone())),
            Box::new(PlaceholderVariablesProcessor::new(self.generators.clone())),
            Box::new(MessageContentProcessor::new(
                self.capabilities.clone(),
                self.image_fetcher.clone(),
                self.file_context,
            )),
            Box::new(ToolCallProcessor::new(
                self.capabilities.clone(),
                self.tool_name_fn.clone(),
            )),
            Box::new(ToolMessageReorder),
            Box::new(MessageCleanup),
        ];
        ContextEngine::new(processors)
    }

    /// Run the pipeline and return the final context, metadata included
    pub async fn run(
        &self,
        request: AssemblyRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineContext, ContextError> {
        let engine = self.engine(&request).with_cancellation(cancel);
        let context = PipelineContext::new(InitialState {
            tools: request.tools.iter().map(|t| t.identifier.clone()).collect(),
            messages: request.messages,
            model: request.model,
            provider: request.provider,
            system_role: request.system_role,
        });
        engine.process(context).await
    }

    /// Run the pipeline and return the wire-ready messages
    pub async fn assemble(
        &self,
        request: AssemblyRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<WireMessage>, ContextError> {
        let context = self.run(request, cancel).await?;
        if context.is_aborted {
            let reason = context.abort_reason.unwrap_or_else(|| "aborted".to_string());
            return Err(ContextError::Aborted(reason));
        }

        debug!(
            model = context.model(),
            messages = context.messages.len(),
            "assembled context"
        );
        Ok(context.to_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::processors::test_support::{FixedCapabilities, StubFetcher};
    use crate::models::message::Role;

    fn assembler() -> ContextAssembler {
        ContextAssembler::new(
            Arc::new(FixedCapabilities {
                vision: true,
                function_call: true,
            }),
            Arc::new(StubFetcher),
        )
    }

    #[test]
    fn test_stage_order() {
        let engine = assembler().engine(&AssemblyRequest::default());
        assert_eq!(
            engine.processor_names(),
            vec![
                "HistoryTruncator",
                "SystemRoleInjector",
                "GuideProvider",
                "ToolSystemRoleProvider",
                "HistorySummaryProvider",
                "InputTemplateProcessor",
                "PlaceholderVariablesProcessor",
                "MessageContentProcessor",
                "ToolCallProcessor",
                "ToolMessageReorder",
                "MessageCleanup",
            ]
        );
    }

    #[tokio::test]
    async fn test_truncation_never_removes_injected_system_role() {
        let request = AssemblyRequest {
            messages: vec![
                Message::user().with_text("one"),
                Message::assistant().with_text("two"),
                Message::user().with_text("three"),
            ],
            model: "gpt-4o".to_string(),
            provider: "openai".to_string(),
            system_role: Some("You are terse.".to_string()),
            enable_history_count: true,
            history_count: Some(1),
            ..Default::default()
        };

        let wire = assembler()
            .assemble(request, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, Role::System);
        assert_eq!(wire[0].content.to_text(), "You are terse.");
        assert_eq!(wire[1].content.to_text(), "three");
    }

    #[tokio::test]
    async fn test_cancelled_assembly_is_an_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = AssemblyRequest {
            messages: vec![Message::user().with_text("hi")],
            ..Default::default()
        };

        let err = assembler().assemble(request, cancel).await.unwrap_err();
        assert_eq!(err, ContextError::Aborted("cancelled".to_string()));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: AssemblyRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"id": "m1", "role": "user", "content": "hi"}],
            "historyCount": 4,
        }))
        .unwrap();
        assert_eq!(request.history_count, Some(4));
        assert!(!request.enable_history_count);
        assert!(request.tools.is_empty());
    }
}
