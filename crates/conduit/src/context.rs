//! Context assembly: turns a stored conversation into the message list a backend
//! receives, through an ordered list of processors.
pub mod assembler;
pub mod engine;
pub mod processors;
pub mod prompts;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::image::ImageError;
use crate::models::content::{ContentPart, MessageContent};
use crate::models::message::{Message, Role, WireMessage};
use crate::models::tool::ToolCall;

pub use assembler::{AssemblyRequest, ContextAssembler};
pub use engine::ContextEngine;
pub use processors::Processor;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Processor {processor} failed: {message}")]
    Processor {
        processor: &'static str,
        message: String,
    },

    #[error("Context assembly aborted: {0}")]
    Aborted(String),
}

/// The inputs a pipeline run starts from. Never modified by processors.
#[derive(Debug, Clone, Default)]
pub struct InitialState {
    pub messages: Vec<Message>,
    pub model: String,
    pub provider: String,
    pub system_role: Option<String>,
    pub tools: Vec<String>,
}

/// A message as it moves through the pipeline.
///
/// `parts` is the derived wire content; `None` means the plain text in
/// `message.content`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMessage {
    pub role: Role,
    pub message: Message,
    pub parts: Option<Vec<ContentPart>>,
    pub tool_calls: Vec<ToolCall>,
    pub name: Option<String>,
}

impl ContextMessage {
    pub fn system<S: Into<String>>(text: S) -> Self {
        Message::system().with_text(text).into()
    }

    pub fn text(&self) -> &str {
        &self.message.content
    }

    pub fn content(&self) -> MessageContent {
        match &self.parts {
            Some(parts) => MessageContent::Parts(parts.clone()),
            None => MessageContent::Text(self.message.content.clone()),
        }
    }

    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            role: self.role,
            content: self.content(),
            name: self.name.clone(),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: match self.role {
                Role::Tool => self.message.tool_call_id.clone(),
                _ => None,
            },
        }
    }
}

impl From<Message> for ContextMessage {
    fn from(message: Message) -> Self {
        ContextMessage {
            role: message.role(),
            message,
            parts: None,
            tool_calls: Vec::new(),
            name: None,
        }
    }
}

/// State threaded through every processor of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub initial_state: InitialState,
    pub messages: Vec<ContextMessage>,
    pub metadata: Map<String, Value>,
    pub is_aborted: bool,
    pub abort_reason: Option<String>,
}

impl PipelineContext {
    pub fn new(initial_state: InitialState) -> Self {
        let mut metadata = Map::new();
        metadata.insert("model".to_string(), json!(initial_state.model));
        metadata.insert("provider".to_string(), json!(initial_state.provider));

        PipelineContext {
            messages: initial_state
                .messages
                .iter()
                .cloned()
                .map(ContextMessage::from)
                .collect(),
            initial_state,
            metadata,
            is_aborted: false,
            abort_reason: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.metadata
            .insert("maxTokens".to_string(), json!(max_tokens));
        self
    }

    pub fn abort<S: Into<String>>(&mut self, reason: S) {
        self.is_aborted = true;
        self.abort_reason = Some(reason.into());
    }

    pub fn model(&self) -> &str {
        &self.initial_state.model
    }

    pub fn provider(&self) -> &str {
        &self.initial_state.provider
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.metadata.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn add_to_counter(&mut self, key: &str, amount: u64) {
        let value = self.counter(key) + amount;
        self.metadata.insert(key.to_string(), json!(value));
    }

    pub fn set_flag(&mut self, key: &str) {
        self.metadata.insert(key.to_string(), Value::Bool(true));
    }

    /// Add text to the leading system message, creating it when absent
    pub fn inject_system_content(&mut self, text: &str) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => {
                let content = &mut first.message.content;
                if !content.is_empty() {
                    content.push_str("\n\n");
                }
                content.push_str(text);
            }
            _ => self.messages.insert(0, ContextMessage::system(text)),
        }
    }

    pub fn to_wire(&self) -> Vec<WireMessage> {
        self.messages.iter().map(ContextMessage::to_wire).collect()
    }
}
