//! The router runtime: picks the backend serving a model and presents every backend
//! through one capability surface.
pub mod backend;
pub mod cache;
pub mod factory;
pub mod registration;
pub mod router;

#[cfg(test)]
pub mod mock;

pub use backend::{
    Backend, BackendOptions, ChatOptions, ChatPayload, EmbeddingsOptions, EmbeddingsPayload,
    TextToImagePayload, TextToSpeechOptions, TextToSpeechPayload,
};
pub use cache::ModelCache;
pub use factory::{backend_factory, ApiType};
pub use registration::{BackendFactory, ModelDeclaration, ModelResolver, RuntimeRegistration};
pub use router::{ErrorHandler, RouterOptions, RouterRuntime};
