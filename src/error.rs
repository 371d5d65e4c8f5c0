use thiserror::Error;

#[derive(Error, Debug)]
pub enum GovernError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Evidence error: {0}")]
    Evidence(String),

    #[error("Invalid transition: cannot apply '{event}' in state '{state}'")]
    Transition { state: String, event: String },

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GovernError>;
