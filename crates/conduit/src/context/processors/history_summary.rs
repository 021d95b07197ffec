use async_trait::async_trait;

use super::Processor;
use crate::context::prompts::history_summary_prompt;
use crate::context::{ContextError, PipelineContext};

/// Adds the summary of history that truncation dropped
pub struct HistorySummaryProvider {
    history_summary: Option<String>,
    formatter: fn(&str) -> Result<String, tera::Error>,
}

impl HistorySummaryProvider {
    pub fn new(history_summary: Option<String>) -> Self {
        Self {
            history_summary,
            formatter: history_summary_prompt,
        }
    }

    pub fn with_formatter(mut self, formatter: fn(&str) -> Result<String, tera::Error>) -> Self {
        self.formatter = formatter;
        self
    }
}

#[async_trait]
impl Processor for HistorySummaryProvider {
    fn name(&self) -> &'static str {
        "HistorySummaryProvider"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let Some(summary) = self.history_summary.as_deref().filter(|s| !s.trim().is_empty())
        else {
            return Ok(context);
        };

        let formatted = (self.formatter)(summary).map_err(|e| ContextError::Processor {
            processor: "HistorySummaryProvider",
            message: e.to_string(),
        })?;
        context.inject_system_content(&formatted);
        context.set_flag("historySummaryInjected");
        Ok(context)
    }
}
