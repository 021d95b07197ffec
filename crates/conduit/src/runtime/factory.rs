use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::backend::{Backend, BackendOptions};
use super::registration::BackendFactory;
use crate::errors::RuntimeResult;
use crate::providers::google::GoogleBackend;
use crate::providers::openai::OpenAiBackend;

/// Api families with a stock backend
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApiType {
    OpenAi,
    Google,
}

fn build_openai(options: BackendOptions) -> RuntimeResult<Arc<dyn Backend>> {
    Ok(Arc::new(OpenAiBackend::new(options)?))
}

fn build_google(options: BackendOptions) -> RuntimeResult<Arc<dyn Backend>> {
    Ok(Arc::new(GoogleBackend::new(options)?))
}

pub fn backend_factory(api_type: ApiType) -> BackendFactory {
    match api_type {
        ApiType::OpenAi => Arc::new(build_openai),
        ApiType::Google => Arc::new(build_google),
    }
}
