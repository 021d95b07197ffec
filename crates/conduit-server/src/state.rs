use std::collections::HashMap;
use std::sync::Arc;

use conduit::context::ContextAssembler;
use conduit::image::{HttpImageFetcher, ImageFetcher};
use conduit::model_bank::ModelBank;
use conduit::runtime::{RouterOptions, RouterRuntime};

use crate::configuration::Settings;
use crate::error::ConfigError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub runtimes: Arc<HashMap<String, Arc<RouterRuntime>>>,
    pub assembler: Arc<ContextAssembler>,
    pub model_bank: Arc<ModelBank>,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let fetcher = Arc::new(HttpImageFetcher::new()?);
        Self::with_image_fetcher(settings, fetcher)
    }

    pub fn with_image_fetcher(
        settings: &Settings,
        image_fetcher: Arc<dyn ImageFetcher>,
    ) -> anyhow::Result<Self> {
        let mut model_bank = ModelBank::new();
        let mut runtimes = HashMap::new();

        for runtime in &settings.runtimes {
            let registrations = runtime
                .routers
                .iter()
                .map(|router| router.to_registration())
                .collect();
            for router in &runtime.routers {
                model_bank = model_bank.with_cards(&runtime.id, &router.model_cards());
            }

            let router = RouterRuntime::new(
                runtime.id.clone(),
                registrations,
                RouterOptions::default(),
            )
            .map_err(|err| ConfigError::InvalidRuntime(format!("{}: {err}", runtime.id)))?;
            tracing::info!(
                runtime = %runtime.id,
                registrations = ?router.registration_ids().collect::<Vec<_>>(),
                "runtime ready"
            );
            runtimes.insert(runtime.id.clone(), Arc::new(router));
        }

        let model_bank = Arc::new(model_bank);
        let assembler = ContextAssembler::new(model_bank.clone(), image_fetcher)
            .with_file_context(settings.file_context.into());

        Ok(Self {
            runtimes: Arc::new(runtimes),
            assembler: Arc::new(assembler),
            model_bank,
        })
    }

    pub fn runtime(&self, provider: &str) -> Option<Arc<RouterRuntime>> {
        self.runtimes.get(provider).cloned()
    }
}
