use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs,
    },
    Client,
};

use crate::config::Config;
use crate::error::EngineError;
use crate::llm::{Embedder, Generator};
use async_trait::async_trait;

/// Chat + embedding client for an OpenAI-compatible endpoint.
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_base(&config.openai_url);

        if let Some(key) = &config.openai_api_key {
            openai_config = openai_config.with_api_key(key);
        } else {
            openai_config = openai_config.with_api_key("unused");
        }

        Self {
            client: Client::with_config(openai_config),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        }
    }

    pub async fn chat(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, EngineError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .build()
            .map_err(EngineError::upstream)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(EngineError::upstream)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| EngineError::Upstream("empty chat completion".into()))?;

        Ok(content)
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(text)
            .build()
            .map_err(EngineError::upstream)?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(EngineError::upstream)?;

        let embedding = response
            .data
            .first()
            .ok_or_else(|| EngineError::Upstream("no embedding returned".into()))?
            .embedding
            .clone();

        Ok(embedding)
    }
}

#[async_trait]
impl Generator for LlmClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, EngineError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(EngineError::upstream)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(EngineError::upstream)?
                .into(),
        ];

        self.chat(messages).await
    }
}
