use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::backend::{
    Backend, BackendOptions, ChatOptions, ChatPayload, EmbeddingsOptions, EmbeddingsPayload,
    TextToImagePayload, TextToSpeechOptions, TextToSpeechPayload,
};
use super::cache::ModelCache;
use super::registration::{ModelDeclaration, RuntimeRegistration};
use crate::errors::{RuntimeError, RuntimeResult};
use crate::model_bank::ModelCard;
use crate::streams::EventStream;

/// Offered every chat failure; a returned error replaces the original
pub type ErrorHandler = Arc<dyn Fn(&RuntimeError) -> Option<RuntimeError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct RouterOptions {
    /// Construction options every registration starts from
    pub backend: BackendOptions,
    pub chat_error_handler: Option<ErrorHandler>,
    /// Share a cache between runtimes; a private one is created otherwise
    pub cache: Option<Arc<ModelCache>>,
}

struct Route {
    id: String,
    models: ModelDeclaration,
    backend: Arc<dyn Backend>,
}

/// Dispatches each call to the backend serving the requested model.
///
/// Registrations are tried in order and the first whose model list contains the model
/// wins. A model no registration lists goes to the last registration, which is
/// expected to be the general purpose one.
pub struct RouterRuntime {
    id: String,
    routes: Vec<Route>,
    cache: Arc<ModelCache>,
    chat_error_handler: Option<ErrorHandler>,
}

impl RouterRuntime {
    /// Build every backend up front. Construction failures are returned as is.
    pub fn new<S: Into<String>>(
        id: S,
        registrations: Vec<RuntimeRegistration>,
        options: RouterOptions,
    ) -> RuntimeResult<Self> {
        let id = id.into();
        if registrations.is_empty() {
            return Err(RuntimeError::Configuration("empty providers".to_string()));
        }

        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(registrations.len());
        for registration in registrations {
            if !seen.insert(registration.id.clone()) {
                return Err(RuntimeError::Configuration(format!(
                    "duplicate registration id {} in runtime {}",
                    registration.id, id
                )));
            }
            let merged = options.backend.merged(&registration.options, &id);
            let backend = (registration.factory)(merged)?;
            debug!(runtime = %id, registration = %registration.id, api_type = %registration.api_type, "backend constructed");
            routes.push(Route {
                id: registration.id,
                models: registration.models,
                backend,
            });
        }

        Ok(Self {
            id,
            routes,
            cache: options.cache.unwrap_or_default(),
            chat_error_handler: options.chat_error_handler,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registration_ids(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.id.as_str())
    }

    async fn route_models(&self, route: &Route) -> RuntimeResult<Vec<String>> {
        match &route.models {
            ModelDeclaration::None => Ok(Vec::new()),
            ModelDeclaration::Static(models) => Ok(models.clone()),
            ModelDeclaration::Resolver(resolve) => {
                let backend = route.backend.clone();
                self.cache
                    .get_or_resolve(&route.id, || resolve(backend))
                    .await
                    .map_err(|err| match err {
                        RuntimeError::ModelResolution { .. } => err,
                        other => RuntimeError::ModelResolution {
                            registration: route.id.clone(),
                            message: other.to_string(),
                        },
                    })
            }
        }
    }

    /// The model ids registration `registration_id` serves
    pub async fn resolve_model_list(&self, registration_id: &str) -> RuntimeResult<Vec<String>> {
        let route = self
            .routes
            .iter()
            .find(|route| route.id == registration_id)
            .ok_or_else(|| {
                RuntimeError::Configuration(format!(
                    "unknown registration {} in runtime {}",
                    registration_id, self.id
                ))
            })?;
        self.route_models(route).await
    }

    pub async fn resolve_backend(&self, model: &str) -> RuntimeResult<Arc<dyn Backend>> {
        for route in &self.routes {
            if self.route_models(route).await?.iter().any(|id| id == model) {
                debug!(runtime = %self.id, model, registration = %route.id, "model routed");
                return Ok(route.backend.clone());
            }
        }

        let fallback = self
            .routes
            .last()
            .ok_or_else(|| RuntimeError::Configuration("empty providers".to_string()))?;
        warn!(runtime = %self.id, model, registration = %fallback.id, "no registration lists model, using the last one");
        Ok(fallback.backend.clone())
    }

    /// Drop cached model lists of one registration, or of all of them
    pub fn invalidate_model_cache(&self, registration_id: Option<&str>) {
        debug!(runtime = %self.id, registration = ?registration_id, "model cache invalidated");
        self.cache.invalidate(registration_id);
    }

    fn handle_chat_error(&self, error: RuntimeError) -> RuntimeError {
        match &self.chat_error_handler {
            Some(handler) => handler(&error).unwrap_or(error),
            None => error,
        }
    }

    pub async fn chat(&self, payload: ChatPayload, options: ChatOptions) -> RuntimeResult<EventStream> {
        let cancel = options.cancel.clone();
        let result = async {
            let backend = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RuntimeError::Cancelled),
                backend = self.resolve_backend(&payload.model) => backend,
            }?;
            backend.chat(payload, options).await
        }
        .await;
        result.map_err(|err| self.handle_chat_error(err))
    }

    pub async fn text_to_image(&self, payload: TextToImagePayload) -> RuntimeResult<Vec<String>> {
        let backend = self.resolve_backend(&payload.model).await?;
        backend.text_to_image(payload).await
    }

    pub async fn embeddings(
        &self,
        payload: EmbeddingsPayload,
        options: EmbeddingsOptions,
    ) -> RuntimeResult<Vec<Vec<f32>>> {
        let backend = self.resolve_backend(&payload.model).await?;
        backend.embeddings(payload, options).await
    }

    pub async fn text_to_speech(
        &self,
        payload: TextToSpeechPayload,
        options: TextToSpeechOptions,
    ) -> RuntimeResult<Bytes> {
        let backend = self.resolve_backend(&payload.model).await?;
        backend.text_to_speech(payload, options).await
    }

    /// The model listing of the first registration only
    pub async fn models(&self) -> RuntimeResult<Vec<ModelCard>> {
        match self.routes.first() {
            Some(route) => route.backend.models().await,
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for RouterRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterRuntime")
            .field("id", &self.id)
            .field("registrations", &self.registration_ids().collect::<Vec<_>>())
            .finish()
    }
}
