use once_cell::sync::OnceCell;
use tiktoken_rs::CoreBPE;

use crate::models::message::Message;

/// Counts tokens with the BPE encoding closest to the target model family
pub struct TokenCounter {
    cl100k: OnceCell<Option<CoreBPE>>,
    o200k: OnceCell<Option<CoreBPE>>,
}

/// Per-message overhead of the chat wire format
const MESSAGE_OVERHEAD: usize = 4;

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter {
    pub fn new() -> Self {
        TokenCounter {
            cl100k: OnceCell::new(),
            o200k: OnceCell::new(),
        }
    }

    fn encoder(&self, model_name: Option<&str>) -> Option<&CoreBPE> {
        let model_name = model_name.unwrap_or("gpt-4o").to_lowercase();
        let uses_o200k = model_name.contains("gpt-4o")
            || model_name.contains("gpt-4.1")
            || model_name.contains("gpt-5")
            || model_name.starts_with("o1")
            || model_name.starts_with("o3")
            || model_name.starts_with("o4");

        let cell = if uses_o200k { &self.o200k } else { &self.cl100k };
        cell.get_or_init(|| {
            let loaded = if uses_o200k {
                tiktoken_rs::o200k_base()
            } else {
                tiktoken_rs::cl100k_base()
            };
            match loaded {
                Ok(bpe) => Some(bpe),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load tokenizer, falling back to estimates");
                    None
                }
            }
        })
        .as_ref()
    }

    pub fn count_tokens(&self, text: &str, model_name: Option<&str>) -> usize {
        match self.encoder(model_name) {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            // roughly four characters per token for english text
            None => text.chars().count().div_ceil(4),
        }
    }

    pub fn count_message_tokens(&self, message: &Message, model_name: Option<&str>) -> usize {
        let reasoning = message
            .reasoning
            .as_ref()
            .map(|r| self.count_tokens(&r.content, model_name))
            .unwrap_or(0);
        self.count_tokens(&message.content, model_name) + reasoning + MESSAGE_OVERHEAD
    }
}
