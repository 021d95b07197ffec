use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, warn};

use super::Processor;
use crate::context::prompts::files_prompt;
use crate::context::{ContextError, PipelineContext};
use crate::image::{resolve_image_url, ImageFetcher};
use crate::model_bank::ModelCapabilities;
use crate::models::content::ContentPart;
use crate::models::message::{ImageAttachment, Message, Role};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileContextConfig {
    pub enabled: bool,
    /// Whether the context block lists attachment urls
    pub include_file_url: bool,
}

/// Derives the wire content of user and assistant turns.
///
/// Without vision a turn is its plain text. With vision it becomes a list of parts:
/// the text when non-empty, then one part per image in attachment order. A reasoning
/// block always leads as a `thinking` part, and an enabled file context forces the
/// list form with the attachments described in the text part.
pub struct MessageContentProcessor {
    capabilities: Arc<dyn ModelCapabilities>,
    image_fetcher: Arc<dyn ImageFetcher>,
    file_context: FileContextConfig,
}

impl MessageContentProcessor {
    pub fn new(
        capabilities: Arc<dyn ModelCapabilities>,
        image_fetcher: Arc<dyn ImageFetcher>,
        file_context: FileContextConfig,
    ) -> Self {
        Self {
            capabilities,
            image_fetcher,
            file_context,
        }
    }

    fn text_with_file_context(&self, message: &Message) -> Result<String, ContextError> {
        let block = files_prompt(
            &message.files,
            &message.images,
            self.file_context.include_file_url,
        )
        .map_err(|e| {
            warn!(error = %e, message_id = %message.id, "failed to render file context");
            ContextError::Processor {
                processor: "MessageContentProcessor",
                message: e.to_string(),
            }
        })?;

        if message.content.is_empty() {
            Ok(block)
        } else {
            Ok(format!("{}\n\n{}", message.content, block))
        }
    }

    async fn build_parts(
        &self,
        message: &Message,
        vision: bool,
    ) -> Result<Option<Vec<ContentPart>>, ContextError> {
        let with_file_context = self.file_context.enabled && !message.files.is_empty();
        let images: &[ImageAttachment] = if vision { &message.images } else { &[] };

        if message.reasoning.is_none() && images.is_empty() && !with_file_context {
            return Ok(None);
        }

        let text = if with_file_context {
            self.text_with_file_context(message)?
        } else {
            message.content.clone()
        };

        let mut parts = Vec::with_capacity(images.len() + 2);
        match &message.reasoning {
            Some(reasoning) => {
                parts.push(ContentPart::thinking(
                    reasoning.content.clone(),
                    reasoning.signature.clone(),
                ));
                parts.push(ContentPart::text(text));
            }
            None if !text.is_empty() => parts.push(ContentPart::text(text)),
            None => {}
        }

        let fetcher = self.image_fetcher.as_ref();
        let urls = try_join_all(
            images
                .iter()
                .map(|image| resolve_image_url(&image.url, fetcher)),
        )
        .await?;
        parts.extend(urls.into_iter().map(ContentPart::image_url));

        Ok(Some(parts))
    }
}

#[async_trait]
impl Processor for MessageContentProcessor {
    fn name(&self) -> &'static str {
        "MessageContentProcessor"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let vision = self
            .capabilities
            .can_use_vision(context.model(), context.provider());

        let mut users = 0;
        let mut assistants = 0;
        for message in &mut context.messages {
            match message.role {
                Role::User => users += 1,
                Role::Assistant => assistants += 1,
                _ => continue,
            }
            message.parts = self.build_parts(&message.message, vision).await?;
        }

        debug!(vision, users, assistants, "derived message content");
        context.add_to_counter("messageContentProcessed", users + assistants);
        context.add_to_counter("userMessagesProcessed", users);
        context.add_to_counter("assistantMessagesProcessed", assistants);
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::processors::test_support::{context_with, FixedCapabilities, StubFetcher};
    use crate::context::prompts::FILE_CONTEXT_START;
    use crate::image::ImageError;
    use crate::models::content::MessageContent;
    use crate::models::message::FileAttachment;

    fn processor(vision: bool, file_context: FileContextConfig) -> MessageContentProcessor {
        MessageContentProcessor::new(
            Arc::new(FixedCapabilities {
                vision,
                function_call: true,
            }),
            Arc::new(StubFetcher),
            file_context,
        )
    }

    fn report() -> FileAttachment {
        FileAttachment {
            id: "f1".to_string(),
            name: "report.pdf".to_string(),
            file_type: "application/pdf".to_string(),
            size: 2048,
            url: "https://files.example.com/f1".to_string(),
        }
    }

    async fn content_of(processor: &MessageContentProcessor, message: Message) -> MessageContent {
        let result = processor.process(context_with(vec![message])).await.unwrap();
        result.messages[0].content()
    }

    #[tokio::test]
    async fn test_vision_disabled_drops_images() {
        let message = Message::user()
            .with_text("Hello")
            .with_image("img", "https://example.com/a.jpg");

        let content = content_of(&processor(false, Default::default()), message).await;
        assert_eq!(content, MessageContent::from("Hello"));
    }

    #[tokio::test]
    async fn test_vision_enabled_text_then_images() {
        let message = Message::user()
            .with_text("Hello")
            .with_image("a", "https://example.com/a.jpg")
            .with_image("b", "https://example.com/b.jpg");

        let content = content_of(&processor(true, Default::default()), message).await;
        let parts = content.as_parts().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].as_text(), Some("Hello"));
        assert_eq!(parts[1].as_image_url(), Some("https://example.com/a.jpg"));
        assert_eq!(parts[2].as_image_url(), Some("https://example.com/b.jpg"));
    }

    #[tokio::test]
    async fn test_assistant_with_images_and_no_text() {
        let message = Message::assistant().with_image("a", "https://example.com/a.jpg");

        let content = content_of(&processor(true, Default::default()), message).await;
        let parts = content.as_parts().unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts.iter().all(|p| p.as_text().is_none()));
    }

    #[tokio::test]
    async fn test_local_image_is_inlined() {
        let message = Message::user()
            .with_text("look")
            .with_image("a", "http://127.0.0.1:3210/files/a.jpg");

        let content = content_of(&processor(true, Default::default()), message).await;
        assert_eq!(
            content.as_parts().unwrap()[1].as_image_url(),
            Some("data:image/jpeg;base64,AAAA")
        );
    }

    #[tokio::test]
    async fn test_image_resolution_failure_fails_the_run() {
        let message = Message::user()
            .with_text("look")
            .with_image("a", "http://localhost/broken.png");

        let err = processor(true, Default::default())
            .process(context_with(vec![message]))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Image(ImageError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_reasoning_leads_regardless_of_vision() {
        for vision in [false, true] {
            let message = Message::assistant()
                .with_text("The answer is 4")
                .with_reasoning("2 + 2", Some("sig".to_string()));

            let content = content_of(&processor(vision, Default::default()), message).await;
            let parts = content.as_parts().unwrap();
            assert_eq!(
                parts[0],
                ContentPart::thinking("2 + 2", Some("sig".to_string()))
            );
            assert_eq!(parts[1].as_text(), Some("The answer is 4"));
        }
    }

    #[tokio::test]
    async fn test_file_context_forces_parts() {
        let config = FileContextConfig {
            enabled: true,
            include_file_url: false,
        };
        let message = Message::user()
            .with_text("Summarize this")
            .with_file(report())
            .with_image("img", "https://example.com/chart.png");

        let content = content_of(&processor(false, config), message).await;
        let parts = content.as_parts().unwrap();
        assert_eq!(parts.len(), 1);
        let text = parts[0].as_text().unwrap();
        assert!(text.starts_with("Summarize this\n\n"));
        assert!(text.contains(FILE_CONTEXT_START));
        assert!(text.contains(r#"name="report.pdf""#));
        assert!(text.contains(r#"<image name="img">"#));
    }

    #[tokio::test]
    async fn test_file_context_disabled() {
        let message = Message::user().with_text("Hello").with_file(report());
        let content = content_of(&processor(false, Default::default()), message).await;
        assert_eq!(content, MessageContent::from("Hello"));
    }

    #[tokio::test]
    async fn test_counters_and_other_roles() {
        let messages = vec![
            Message::system().with_text("be brief"),
            Message::user().with_text("a"),
            Message::assistant().with_text("b"),
            Message::user().with_text("c"),
        ];

        let result = processor(true, Default::default())
            .process(context_with(messages))
            .await
            .unwrap();
        assert_eq!(result.counter("messageContentProcessed"), 3);
        assert_eq!(result.counter("userMessagesProcessed"), 2);
        assert_eq!(result.counter("assistantMessagesProcessed"), 1);
        assert!(result.messages[0].parts.is_none());
    }
}
