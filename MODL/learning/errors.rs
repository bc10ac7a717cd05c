use thiserror::Error;

/// Errors raised by the learning engine.
#[derive(Debug, Error)]
pub enum LearningError {
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// TOML parsing failure.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Argument outside its valid domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Attribute missing from a dictionary.
    #[error("unknown variable {0}")]
    UnknownAttribute(String),
    /// Class missing from a domain.
    #[error("unknown dictionary {0}")]
    UnknownClass(String),
    /// Attribute name already used in a dictionary.
    #[error("variable {0} already exists")]
    DuplicateAttribute(String),
    /// Invalid derivation rule or rule graph.
    #[error("derivation error: {0}")]
    Derivation(String),
    /// Positional stream misuse (underflow, type mismatch, wrong mode).
    #[error("serialization stream: {0}")]
    Stream(String),
    /// Predictor training or evaluation failure.
    #[error("evaluation error: {0}")]
    Evaluation(String),
    /// Another scoped domain is already installed.
    #[error("a class domain is already installed as current domain")]
    DomainBusy,
    /// Error collection misuse.
    #[error("error collection: {0}")]
    Collection(String),
}
