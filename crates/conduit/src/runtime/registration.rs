use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::backend::{Backend, BackendOptions};
use super::factory::{backend_factory, ApiType};
use crate::errors::{RuntimeError, RuntimeResult};

/// Builds a backend from merged construction options
pub type BackendFactory =
    Arc<dyn Fn(BackendOptions) -> RuntimeResult<Arc<dyn Backend>> + Send + Sync>;

/// Resolves the model ids a registration serves, given its constructed backend
pub type ModelResolver = Arc<
    dyn Fn(Arc<dyn Backend>) -> BoxFuture<'static, RuntimeResult<Vec<String>>> + Send + Sync,
>;

/// Which models a registration serves
#[derive(Clone, Default)]
pub enum ModelDeclaration {
    /// Serves nothing by name; reachable only as the fallback
    #[default]
    None,
    Static(Vec<String>),
    /// Resolved on first use and cached until invalidated
    Resolver(ModelResolver),
}

impl ModelDeclaration {
    pub fn resolver<F, Fut>(resolve: F) -> Self
    where
        F: Fn(Arc<dyn Backend>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = RuntimeResult<Vec<String>>> + Send + 'static,
    {
        ModelDeclaration::Resolver(Arc::new(move |backend: Arc<dyn Backend>| resolve(backend).boxed()))
    }

    /// Whatever the backend's own model listing reports
    pub fn backend_models() -> Self {
        Self::resolver(|backend: Arc<dyn Backend>| async move {
            let cards = backend.models().await?;
            Ok::<_, RuntimeError>(cards.into_iter().map(|card| card.id).collect())
        })
    }
}

impl std::fmt::Debug for ModelDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelDeclaration::None => f.write_str("None"),
            ModelDeclaration::Static(models) => f.debug_tuple("Static").field(models).finish(),
            ModelDeclaration::Resolver(_) => f.write_str("Resolver"),
        }
    }
}

/// Static configuration binding an api family to a backend and the models it serves
#[derive(Clone)]
pub struct RuntimeRegistration {
    /// Identity used for cache keys and logs; defaults to the api type
    pub id: String,
    pub api_type: ApiType,
    pub options: BackendOptions,
    pub factory: BackendFactory,
    pub models: ModelDeclaration,
}

impl RuntimeRegistration {
    /// A registration built by the stock backend of `api_type`
    pub fn new(api_type: ApiType) -> Self {
        Self::with_factory(api_type, backend_factory(api_type))
    }

    pub fn with_factory(api_type: ApiType, factory: BackendFactory) -> Self {
        RuntimeRegistration {
            id: api_type.to_string(),
            api_type,
            options: BackendOptions::default(),
            factory,
            models: ModelDeclaration::None,
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_options(mut self, options: BackendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = ModelDeclaration::Static(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_model_declaration(mut self, models: ModelDeclaration) -> Self {
        self.models = models;
        self
    }
}

impl std::fmt::Debug for RuntimeRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeRegistration")
            .field("id", &self.id)
            .field("api_type", &self.api_type)
            .field("options", &self.options)
            .field("models", &self.models)
            .finish()
    }
}
