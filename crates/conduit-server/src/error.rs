use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),

    #[error("Invalid runtime configuration: {0}")]
    InvalidRuntime(String),
}

/// The environment variable that sets a dotted config key
pub fn to_env_var(field_path: &str) -> String {
    let path = field_path.replace('.', "__").to_uppercase();
    format!("CONDUIT_{path}")
}
