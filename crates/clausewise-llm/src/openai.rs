//! Client for OpenAI-compatible HTTP APIs (hosted OpenAI, Ollama's `/v1`,
//! vLLM, ...). One type serves both generation backends and remote
//! embeddings.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use clausewise_core::config::BackendConfig;
use clausewise_core::error::{Error, Result, ServiceError};
use clausewise_core::traits::{EmbeddingService, GenerationRequest, GenerationService};

#[derive(Clone)]
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    http: reqwest::Client,
    probe_timeout: Duration,
    embedding: Option<EmbeddingModel>,
}

#[derive(Clone)]
struct EmbeddingModel {
    model: String,
    id: String,
    dim: usize,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

fn transport_err(e: reqwest::Error) -> ServiceError {
    if e.is_connect() {
        ServiceError::Unavailable(e.to_string())
    } else {
        ServiceError::Transport(e.to_string())
    }
}

/// Strip a Markdown code fence some local models wrap JSON in.
fn unfence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

impl OpenAiCompatClient {
    pub fn from_config(config: &BackendConfig, probe_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot build HTTP client for '{}': {}", config.name, e)))?;
        let api_key = config.api_key_env.as_deref().and_then(|var| env::var(var).ok()).filter(|k| !k.trim().is_empty());
        Ok(Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            http,
            probe_timeout,
            embedding: None,
        })
    }

    /// Enable [`EmbeddingService`] on this client using `/embeddings`.
    pub fn with_embedding_model(mut self, model: impl Into<String>, dim: usize) -> Self {
        let model = model.into();
        let id = format!("{}:{}", self.name, model);
        self.embedding = Some(EmbeddingModel { model, id, dim });
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(&self, req: reqwest::RequestBuilder) -> std::result::Result<T, ServiceError> {
        let resp = req.send().await.map_err(transport_err)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status { status: status.as_u16(), body });
        }
        resp.json::<T>().await.map_err(|e| ServiceError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl GenerationService for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> bool {
        match self.request(reqwest::Method::GET, "/models").timeout(self.probe_timeout).send().await {
            Ok(resp) => {
                debug!(backend = %self.name, status = resp.status().as_u16(), "probe answered");
                resp.status().is_success()
            }
            Err(e) => {
                debug!(backend = %self.name, error = %e, "probe failed");
                false
            }
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> std::result::Result<Value, ServiceError> {
        let system = format!("{}\n\nRespond only with a JSON object matching this JSON schema:\n{}", request.system, request.schema);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "system", content: &system }, ChatMessage { role: "user", content: &request.prompt }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: json!({ "type": "json_object" }),
        };
        let resp: ChatResponse = self.send_json(self.request(reqwest::Method::POST, "/chat/completions").json(&body)).await?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::Malformed("completion has no content".into()))?;
        debug!(backend = %self.name, purpose = %request.purpose, chars = content.len(), "generation returned");
        serde_json::from_str(unfence(&content)).map_err(|e| ServiceError::Malformed(format!("completion is not JSON: {}", e)))
    }
}

#[async_trait]
impl EmbeddingService for OpenAiCompatClient {
    fn model_id(&self) -> &str {
        self.embedding.as_ref().map(|e| e.id.as_str()).unwrap_or(self.name.as_str())
    }

    fn dim(&self) -> usize {
        self.embedding.as_ref().map(|e| e.dim).unwrap_or(0)
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ServiceError> {
        let model = self
            .embedding
            .as_ref()
            .ok_or_else(|| ServiceError::Unavailable(format!("backend '{}' has no embedding model configured", self.name)))?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbedRequest { model: &model.model, input: texts };
        let mut resp: EmbedResponse = self.send_json(self.request(reqwest::Method::POST, "/embeddings").json(&body)).await?;
        if resp.data.len() != texts.len() {
            return Err(ServiceError::Malformed(format!("asked for {} embeddings, got {}", texts.len(), resp.data.len())));
        }
        resp.data.sort_by_key(|d| d.index);
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfence_strips_code_blocks() {
        assert_eq!(unfence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(unfence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(unfence("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn unreachable_backend_fails_probe() {
        let config = BackendConfig {
            name: "local".into(),
            base_url: "http://127.0.0.1:9/v1".into(),
            model: "m".into(),
            api_key_env: None,
            timeout_secs: 1,
        };
        let client = OpenAiCompatClient::from_config(&config, Duration::from_millis(300)).unwrap();
        assert!(!client.probe().await);
        assert!(client.api_key.is_none());
    }
}
