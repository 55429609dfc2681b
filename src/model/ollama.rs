use std::collections::HashMap;
use std::io::Write;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Embedder, Message, ModelError, ModelResult, Prompter};

const DEFAULT_LOCAL_ADDR: &str = "http://127.0.0.1:11434";

const INFO_PATH: &str = "/api/show";
const EMBEDDING_PATH: &str = "/api/embeddings";
const GENERATE_PATH: &str = "/api/generate";

/// Client for a (typically local) Ollama server.
#[derive(Debug)]
pub struct OllamaModel {
    client: Client,
    addr: String,
    model: String,
}

#[derive(Serialize)]
struct ShowRequest {
    name: String,
}

#[derive(Deserialize)]
struct ShowResponse {}

#[derive(Debug, PartialEq, Serialize, Default)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i64>,
}

impl GenerateOptions {
    fn from_metadata(metadata: &HashMap<String, String>) -> Option<Self> {
        let temperature = metadata.get("temperature").and_then(|v| v.parse().ok());
        let num_predict = metadata.get("num_predict").and_then(|v| v.parse().ok());
        if temperature.is_none() && num_predict.is_none() {
            return None;
        }
        Some(Self {
            temperature,
            num_predict,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
}

impl OllamaModel {
    /// Connect to the server at `addr` and verify `model` exists there.
    pub async fn new(addr: &str, model: &str) -> ModelResult<Self> {
        Url::parse(addr).map_err(|_| ModelError::Address(addr.to_string()))?;
        let m = Self {
            client: Client::new(),
            addr: addr.trim_end_matches('/').to_string(),
            model: model.to_string(),
        };
        m.info().await?;
        Ok(m)
    }

    /// Connect to the default local server.
    pub async fn local(model: &str) -> ModelResult<Self> {
        Self::new(DEFAULT_LOCAL_ADDR, model).await
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> ModelResult<R>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.addr, path);
        debug!(url = %url, model = %self.model, "posting model request");
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    async fn info(&self) -> ModelResult<ShowResponse> {
        let request = ShowRequest {
            name: self.model.clone(),
        };
        self.post_json(INFO_PATH, &request).await
    }
}

#[async_trait]
impl Prompter for OllamaModel {
    async fn prompt(&self, message: &Message, out: &mut (dyn Write + Send)) -> ModelResult<()> {
        let prompt = if message.context.is_empty() {
            message.user.clone()
        } else {
            format!("{} {}", message.context, message.user)
        };
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            system: message.system.clone(),
            stream: false,
            options: GenerateOptions::from_metadata(&message.metadata),
        };
        let response: GenerateResponse = self.post_json(GENERATE_PATH, &request).await?;
        out.write_all(response.response.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl Embedder for OllamaModel {
    async fn embeddings(&self, text: &str) -> ModelResult<Vec<f64>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };
        let response: EmbeddingResponse = self.post_json(EMBEDDING_PATH, &request).await?;
        Ok(response.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_omits_empty_fields() {
        let request = GenerateRequest {
            model: "mistral".to_string(),
            prompt: "hello".to_string(),
            system: String::new(),
            stream: false,
            options: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("options").is_none());
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn metadata_maps_to_generation_options() {
        let mut metadata = HashMap::new();
        metadata.insert("temperature".to_string(), "0.2".to_string());
        metadata.insert("num_predict".to_string(), "128".to_string());
        assert_eq!(
            GenerateOptions::from_metadata(&metadata),
            Some(GenerateOptions {
                temperature: Some(0.2),
                num_predict: Some(128),
            })
        );
        assert_eq!(GenerateOptions::from_metadata(&HashMap::new()), None);
    }

    #[tokio::test]
    async fn rejects_unparsable_address() {
        let result = OllamaModel::new("not a url", "mistral").await;
        assert!(matches!(result, Err(ModelError::Address(_))));
    }

    // Exercised only when a local Ollama server with the model is running;
    // otherwise the construction probe fails and the test is a no-op.
    #[tokio::test]
    async fn local_server_round_trip() {
        let Ok(model) = OllamaModel::local("mistral").await else {
            return;
        };
        let mut buf = Vec::new();
        let message = Message {
            user: "What is the answer for 12 + 30? Answer with number only.".to_string(),
            ..Default::default()
        };
        model.prompt(&message, &mut buf).await.unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("42"));

        let once = model.embeddings("This is a test for embeddings").await.unwrap();
        let twice = model.embeddings("This is a test for embeddings").await.unwrap();
        assert!(!once.is_empty());
        assert_eq!(once, twice);
    }
}
