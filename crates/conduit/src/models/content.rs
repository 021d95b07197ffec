use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default)]
    pub detail: ImageDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One part of a structured wire content list
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url<S: Into<String>>(url: S) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: ImageDetail::Auto,
            },
        }
    }

    pub fn thinking<S: Into<String>>(thinking: S, signature: Option<String>) -> Self {
        ContentPart::Thinking {
            thinking: thinking.into(),
            signature,
        }
    }

    /// Get the text if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Get the image url if this is an image part
    pub fn as_image_url(&self) -> Option<&str> {
        match self {
            ContentPart::ImageUrl { image_url } => Some(&image_url.url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// Wire content: a plain string, or an ordered list of parts
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Parts(_) => None,
        }
    }

    pub fn as_parts(&self) -> Option<&[ContentPart]> {
        match self {
            MessageContent::Parts(parts) => Some(parts),
            MessageContent::Text(_) => None,
        }
    }

    /// All text carried by this content, text parts joined by newlines
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parts_serialization() {
        let content = MessageContent::Parts(vec![
            ContentPart::thinking("hmm", Some("sig".to_string())),
            ContentPart::text("Hello"),
            ContentPart::image_url("https://example.com/a.png"),
        ]);

        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            json!([
                {"type": "thinking", "thinking": "hmm", "signature": "sig"},
                {"type": "text", "text": "Hello"},
                {"type": "image_url", "image_url": {"url": "https://example.com/a.png", "detail": "auto"}}
            ])
        );
    }

    #[test]
    fn test_plain_text_is_a_bare_string() {
        let content = MessageContent::from("Hello");
        assert_eq!(serde_json::to_value(&content).unwrap(), json!("Hello"));

        let parsed: MessageContent = serde_json::from_value(json!("Hi")).unwrap();
        assert_eq!(parsed.as_text(), Some("Hi"));
    }

    #[test]
    fn test_to_text_joins_text_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("one"),
            ContentPart::image_url("https://example.com/a.png"),
            ContentPart::text("two"),
        ]);
        assert_eq!(content.to_text(), "one\ntwo");
    }
}
