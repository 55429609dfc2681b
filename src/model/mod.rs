pub mod ollama;

use std::collections::HashMap;
use std::io::Write;

use async_trait::async_trait;
use thiserror::Error;

pub use ollama::OllamaModel;

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors surfaced by the model client.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model address: {0}")]
    Address(String),

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model endpoint {path} returned status {status}")]
    Status { path: String, status: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One request to the model. `context` is prepended to the user prompt;
/// recognized `metadata` keys (`temperature`, `num_predict`) are forwarded
/// as generation options.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub system: String,
    pub user: String,
    pub context: String,
    pub template: String,
    pub metadata: HashMap<String, String>,
}

#[async_trait]
pub trait Prompter {
    /// Generate text for `message` and write it to `out`.
    async fn prompt(&self, message: &Message, out: &mut (dyn Write + Send)) -> ModelResult<()>;
}

#[async_trait]
pub trait Embedder {
    /// Embedding vector for `text`. Deterministic: identical input yields an
    /// identical vector on repeated calls.
    async fn embeddings(&self, text: &str) -> ModelResult<Vec<f64>>;
}

pub trait Model: Prompter + Embedder {}

impl<T: Prompter + Embedder> Model for T {}
