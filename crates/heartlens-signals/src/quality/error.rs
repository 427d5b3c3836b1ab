use std::path::PathBuf;
use thiserror::Error;

/// Failures loading or running a quality model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read model '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model shape error: {0}")]
    Shape(String),

    #[error("Model contains non-finite parameter in {0}")]
    NonFiniteParameter(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Errors crossing the classifier boundary. Only the monitor sees these.
#[derive(Error, Debug)]
pub enum QualityError {
    #[error("Quality model is not loaded")]
    ModelUnavailable,

    #[error("Feature {index} ({name}) is not finite")]
    NonFiniteFeature { index: usize, name: &'static str },

    #[error(transparent)]
    Model(#[from] ModelError),
}
