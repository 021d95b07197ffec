use async_trait::async_trait;

use super::Processor;
use crate::context::prompts::{INBOX_GUIDE_SYSTEM_ROLE, INBOX_SESSION_ID};
use crate::context::{ContextError, PipelineContext};

/// Adds onboarding guidance when the welcome question is asked in the inbox session
pub struct GuideProvider {
    guide_system_role: String,
    inbox_session_id: String,
    session_id: Option<String>,
    is_welcome_question: bool,
}

impl GuideProvider {
    pub fn new(session_id: Option<String>, is_welcome_question: bool) -> Self {
        Self {
            guide_system_role: INBOX_GUIDE_SYSTEM_ROLE.to_string(),
            inbox_session_id: INBOX_SESSION_ID.to_string(),
            session_id,
            is_welcome_question,
        }
    }

    pub fn with_guide<S: Into<String>>(mut self, guide_system_role: S) -> Self {
        self.guide_system_role = guide_system_role.into();
        self
    }
}

#[async_trait]
impl Processor for GuideProvider {
    fn name(&self) -> &'static str {
        "GuideProvider"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let in_inbox = self.session_id.as_deref() == Some(self.inbox_session_id.as_str());
        if !self.is_welcome_question || !in_inbox {
            return Ok(context);
        }

        context.inject_system_content(&self.guide_system_role);
        context.set_flag("guideInjected");
        Ok(context)
    }
}
