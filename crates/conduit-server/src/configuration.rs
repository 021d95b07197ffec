use std::net::{AddrParseError, SocketAddr};
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use conduit::context::processors::FileContextConfig;
use conduit::model_bank::ModelCard;
use conduit::model_list::parse_model_string;
use conduit::runtime::{ApiType, BackendOptions, ModelDeclaration, RuntimeRegistration};
use serde::Deserialize;

use crate::error::{to_env_var, ConfigError};

const DEFAULT_CONFIG_FILE: &str = "conduit.toml";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// One backend registration inside a runtime
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    pub api_type: ApiType,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Models served, listed explicitly
    #[serde(default)]
    pub models: Option<Vec<String>>,
    /// Models served, as a model list string such as `+gpt-4o,-gpt-3.5-turbo`
    #[serde(default)]
    pub model_string: Option<String>,
}

impl RouterSettings {
    fn provider(&self) -> String {
        self.api_type.to_string()
    }

    /// Cards described by the model string, used as capability overrides
    pub fn model_cards(&self) -> Vec<ModelCard> {
        self.model_string
            .as_deref()
            .map(|s| parse_model_string(&self.provider(), s, false).add)
            .unwrap_or_default()
    }

    fn model_declaration(&self) -> ModelDeclaration {
        if let Some(models) = &self.models {
            return ModelDeclaration::Static(models.clone());
        }
        let listed: Vec<String> = self.model_cards().into_iter().map(|card| card.id).collect();
        if listed.is_empty() {
            ModelDeclaration::backend_models()
        } else {
            ModelDeclaration::Static(listed)
        }
    }

    pub fn to_registration(&self) -> RuntimeRegistration {
        let options = BackendOptions {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            ..Default::default()
        };
        let registration = RuntimeRegistration::new(self.api_type)
            .with_options(options)
            .with_model_declaration(self.model_declaration());
        match &self.id {
            Some(id) => registration.with_id(id),
            None => registration,
        }
    }
}

/// A named runtime; its id is the `:provider` segment of the chat routes
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSettings {
    pub id: String,
    #[serde(default)]
    pub routers: Vec<RouterSettings>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FileContextSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub include_file_url: bool,
}

impl From<FileContextSettings> for FileContextConfig {
    fn from(settings: FileContextSettings) -> Self {
        FileContextConfig {
            enabled: settings.enabled,
            include_file_url: settings.include_file_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub runtimes: Vec<RuntimeSettings>,
    #[serde(default)]
    pub file_context: FileContextSettings,
}

impl Settings {
    /// Load from `CONDUIT_CONFIG` (or `conduit.toml` when present), then the environment
    pub fn new() -> Result<Self, ConfigError> {
        match std::env::var("CONDUIT_CONFIG") {
            Ok(path) => Self::load(Path::new(&path), true),
            Err(_) => Self::load(Path::new(DEFAULT_CONFIG_FILE), false),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load(path, true)
    }

    fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                Environment::with_prefix("CONDUIT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                return if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                };
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runtimes.is_empty() {
            return Err(ConfigError::InvalidRuntime(
                "at least one runtime must be configured".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for runtime in &self.runtimes {
            if !seen.insert(runtime.id.as_str()) {
                return Err(ConfigError::InvalidRuntime(format!(
                    "runtime {} is configured twice",
                    runtime.id
                )));
            }
            if runtime.routers.is_empty() {
                return Err(ConfigError::InvalidRuntime(format!(
                    "runtime {} has no routers",
                    runtime.id
                )));
            }
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}
