use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Processor;
use crate::context::{ContextError, PipelineContext};
use crate::token_counter::TokenCounter;

/// Keeps the newest turns: at most `history_count` of them when enabled, and within
/// an optional token budget. The newest turn always survives the budget.
pub struct HistoryTruncator {
    enable_history_count: bool,
    history_count: Option<usize>,
    token_budget: Option<(usize, Arc<TokenCounter>)>,
}

impl HistoryTruncator {
    pub fn new(enable_history_count: bool, history_count: Option<usize>) -> Self {
        Self {
            enable_history_count,
            history_count,
            token_budget: None,
        }
    }

    pub fn with_token_budget(mut self, budget: usize, counter: Arc<TokenCounter>) -> Self {
        self.token_budget = Some((budget, counter));
        self
    }
}

#[async_trait]
impl Processor for HistoryTruncator {
    fn name(&self) -> &'static str {
        "HistoryTruncator"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let before = context.messages.len();

        if self.enable_history_count {
            if let Some(count) = self.history_count {
                let skip = context.messages.len().saturating_sub(count);
                context.messages.drain(..skip);
            }
        }

        if let Some((budget, counter)) = &self.token_budget {
            let model = context.initial_state.model.clone();
            let mut used = 0;
            let mut keep = 0;
            for message in context.messages.iter().rev() {
                used += counter.count_message_tokens(&message.message, Some(&model));
                if used > *budget && keep > 0 {
                    break;
                }
                keep += 1;
            }
            let skip = context.messages.len() - keep;
            context.messages.drain(..skip);
        }

        let dropped = before - context.messages.len();
        if dropped > 0 {
            debug!(dropped, kept = context.messages.len(), "truncated history");
        }
        context.add_to_counter("historyTruncated", dropped as u64);
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::processors::test_support::context_with;
    use crate::models::message::Message;

    fn conversation(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::user().with_text(format!("message {i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_disabled_keeps_everything() {
        let processor = HistoryTruncator::new(false, Some(1));
        let result = processor.process(context_with(conversation(5))).await.unwrap();
        assert_eq!(result.messages.len(), 5);
        assert_eq!(result.counter("historyTruncated"), 0);
    }

    #[tokio::test]
    async fn test_keeps_newest_turns() {
        let processor = HistoryTruncator::new(true, Some(2));
        let result = processor.process(context_with(conversation(5))).await.unwrap();
        let texts: Vec<_> = result.messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["message 3", "message 4"]);
        assert_eq!(result.counter("historyTruncated"), 3);
    }

    #[tokio::test]
    async fn test_zero_count_keeps_nothing() {
        let processor = HistoryTruncator::new(true, Some(0));
        let result = processor.process(context_with(conversation(3))).await.unwrap();
        assert!(result.messages.is_empty());
    }

    #[tokio::test]
    async fn test_token_budget_keeps_newest_message() {
        let counter = Arc::new(TokenCounter::new());
        let long = "word ".repeat(200);
        let messages = vec![
            Message::user().with_text(long.clone()),
            Message::assistant().with_text(long),
        ];

        let processor = HistoryTruncator::new(false, None).with_token_budget(10, counter);
        let result = processor.process(context_with(messages)).await.unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, crate::models::message::Role::Assistant);
    }
}
