use super::content::MessageContent;
use super::tool::{default_tool_type, ToolCall};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub id: String,
    pub name: String,
    /// Media type, e.g. `application/pdf`
    pub file_type: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A tool invocation recorded on an assistant turn, or the invocation a tool
/// result answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub id: String,
    pub identifier: String,
    pub api_name: String,
    /// JSON encoded arguments
    #[serde(default)]
    pub arguments: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
}

impl ToolInvocation {
    pub fn new<I, T, A>(id: I, identifier: T, api_name: A) -> Self
    where
        I: Into<String>,
        T: Into<String>,
        A: Into<String>,
    {
        ToolInvocation {
            id: id.into(),
            identifier: identifier.into(),
            api_name: api_name.into(),
            arguments: "{}".to_string(),
            kind: default_tool_type(),
        }
    }

    pub fn with_arguments<S: Into<String>>(mut self, arguments: S) -> Self {
        self.arguments = arguments.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A stored conversation turn
///
/// The role is fixed at creation. The text in `content` is the authoritative source the
/// pipeline derives wire content from.
pub struct Message {
    pub id: String,
    role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Message {
    pub fn new(role: Role) -> Self {
        let now = Utc::now().timestamp_millis();
        Message {
            id: format!("msg_{}", nanoid::nanoid!()),
            role,
            content: String::new(),
            images: Vec::new(),
            files: Vec::new(),
            reasoning: None,
            tools: Vec::new(),
            tool_call_id: None,
            plugin: None,
            meta: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    pub fn system() -> Self {
        Self::new(Role::System)
    }

    /// Create a tool result answering `invocation`
    pub fn tool(invocation: ToolInvocation) -> Self {
        let mut message = Self::new(Role::Tool);
        message.tool_call_id = Some(invocation.id.clone());
        message.plugin = Some(invocation);
        message
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = text.into();
        self
    }

    pub fn with_image<I: Into<String>, U: Into<String>>(mut self, id: I, url: U) -> Self {
        self.images.push(ImageAttachment {
            id: id.into(),
            url: url.into(),
            alt: None,
        });
        self
    }

    pub fn with_file(mut self, file: FileAttachment) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_reasoning<S: Into<String>>(mut self, content: S, signature: Option<String>) -> Self {
        self.reasoning = Some(Reasoning {
            content: content.into(),
            signature,
        });
        self
    }

    pub fn with_tool_invocation(mut self, invocation: ToolInvocation) -> Self {
        self.tools.push(invocation);
        self
    }
}

/// A message in the OpenAI chat shape, as produced by the context pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn new<C: Into<MessageContent>>(role: Role, content: C) -> Self {
        WireMessage {
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builders() {
        let message = Message::user()
            .with_text("Hello")
            .with_image("img1", "https://example.com/a.png");

        assert_eq!(message.role(), Role::User);
        assert_eq!(message.content, "Hello");
        assert_eq!(message.images[0].url, "https://example.com/a.png");
        assert!(message.id.starts_with("msg_"));
    }

    #[test]
    fn test_tool_message_answers_invocation() {
        let invocation = ToolInvocation::new("call_1", "search", "query");
        let message = Message::tool(invocation).with_text("result");

        assert_eq!(message.role(), Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.plugin.unwrap().api_name, "query");
    }

    #[test]
    fn test_deserialize_stored_turn() {
        let message: Message = serde_json::from_value(json!({
            "id": "m1",
            "role": "assistant",
            "content": "done",
            "reasoning": {"content": "thinking", "signature": "sig"},
            "tools": [{"id": "c1", "identifier": "calc", "apiName": "add", "arguments": "{}"}]
        }))
        .unwrap();

        assert_eq!(message.role(), Role::Assistant);
        assert_eq!(message.tools[0].kind, "default");
        assert_eq!(message.reasoning.unwrap().signature.as_deref(), Some("sig"));
    }

    #[test]
    fn test_wire_message_skips_empty_fields() {
        let wire = WireMessage::new(Role::User, "hi");
        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            json!({"role": "user", "content": "hi"})
        );
    }
}
