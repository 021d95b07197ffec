use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::backend::{
    Backend, BackendOptions, ChatOptions, ChatPayload, EmbeddingsOptions, EmbeddingsPayload,
    TextToImagePayload,
};
use super::registration::BackendFactory;
use crate::errors::{RuntimeError, RuntimeResult};
use crate::model_bank::ModelCard;
use crate::streams::{EventPayload, EventStream, StreamEvent};

/// A backend answering every call with its own name, for routing tests
pub struct MockBackend {
    pub name: String,
    pub options: BackendOptions,
    chat_error: Option<RuntimeError>,
    pub chat_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new<S: Into<String>>(name: S, options: BackendOptions) -> Self {
        Self {
            name: name.into(),
            options,
            chat_error: None,
            chat_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing<S: Into<String>>(name: S, error: RuntimeError) -> Self {
        Self {
            chat_error: Some(error),
            ..Self::new(name, BackendOptions::default())
        }
    }

    /// A factory building a `MockBackend` called `name`, recording its options
    pub fn factory(name: &str, built: Arc<Mutex<Vec<BackendOptions>>>) -> BackendFactory {
        let name = name.to_string();
        Arc::new(move |options: BackendOptions| -> RuntimeResult<Arc<dyn Backend>> {
            built.lock().unwrap().push(options.clone());
            Ok(Arc::new(MockBackend::new(name.clone(), options)))
        })
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn chat(&self, payload: ChatPayload, _options: ChatOptions) -> RuntimeResult<EventStream> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.chat_error {
            return Err(error.clone());
        }
        let events = vec![
            StreamEvent::new("chat_mock", EventPayload::Text(format!("{}:{}", self.name, payload.model))),
            StreamEvent::new("chat_mock", EventPayload::Stop("stop".to_string())),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn text_to_image(&self, _payload: TextToImagePayload) -> RuntimeResult<Vec<String>> {
        Ok(vec![self.name.clone()])
    }

    async fn embeddings(
        &self,
        payload: EmbeddingsPayload,
        _options: EmbeddingsOptions,
    ) -> RuntimeResult<Vec<Vec<f32>>> {
        Ok(payload.input.iter().map(|text| vec![text.len() as f32]).collect())
    }

    async fn models(&self) -> RuntimeResult<Vec<ModelCard>> {
        Ok(vec![ModelCard::new(format!("{}-model", self.name))])
    }
}
