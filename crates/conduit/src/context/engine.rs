use std::fmt;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::processors::Processor;
use super::{ContextError, PipelineContext};

/// Runs processors in order, each receiving the previous one's output
pub struct ContextEngine {
    processors: Vec<Box<dyn Processor>>,
    cancel: Option<CancellationToken>,
}

impl ContextEngine {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self {
            processors,
            cancel: None,
        }
    }

    /// Abort the run before the next processor once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub async fn process(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let started = Instant::now();

        for processor in &self.processors {
            let cancelled = self.cancel.as_ref().is_some_and(|c| c.is_cancelled());
            if cancelled && !context.is_aborted {
                context.abort("cancelled");
            }

            let stage_started = Instant::now();
            context = processor.process(context).await?;
            debug!(
                processor = processor.name(),
                elapsed_us = stage_started.elapsed().as_micros() as u64,
                messages = context.messages.len(),
                aborted = context.is_aborted,
                "context processor completed"
            );
        }

        debug!(
            processors = self.processors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "context pipeline completed"
        );
        Ok(context)
    }
}

impl fmt::Debug for ContextEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextEngine")
            .field("processors", &self.processor_names())
            .finish()
    }
}
