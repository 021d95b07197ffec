use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use super::Processor;
use crate::context::{ContextError, PipelineContext};
use crate::models::message::Role;

lazy_static! {
    static ref TEXT_SLOT: Regex = Regex::new(r"\{\{\s*text\s*\}\}").unwrap();
}

/// Wraps the latest user turn in the agent's input template
pub struct InputTemplateProcessor {
    input_template: Option<String>,
}

impl InputTemplateProcessor {
    pub fn new(input_template: Option<String>) -> Self {
        Self { input_template }
    }
}

pub(crate) fn apply_input_template(template: &str, text: &str) -> String {
    TEXT_SLOT
        .replace_all(template, regex::NoExpand(text))
        .into_owned()
}

#[async_trait]
impl Processor for InputTemplateProcessor {
    fn name(&self) -> &'static str {
        "InputTemplateProcessor"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let Some(template) = self.input_template.as_deref().filter(|t| !t.trim().is_empty())
        else {
            return Ok(context);
        };

        if let Some(latest) = context
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::User)
        {
            latest.message.content = apply_input_template(template, &latest.message.content);
            context.set_flag("inputTemplateApplied");
        }
        Ok(context)
    }
}
