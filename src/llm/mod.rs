pub mod client;

pub use client::LlmClient;

use crate::error::EngineError;
use async_trait::async_trait;

/// Maps text to a fixed-length vector. Production implementation is
/// [`LlmClient`]; tests inject deterministic embedders.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

/// Produces an answer from a system instruction and a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, EngineError>;
}
