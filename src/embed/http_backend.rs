use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Embedder backed by an OpenAI-compatible `/v1/embeddings` endpoint
pub struct HttpEmbedder {
    client: Client,
    url: Url,
    model: String,
    dimension: usize,
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

/// Providers disagree on the response envelope; accept the common shapes
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Data { data: Vec<EmbeddingData> },
    Embeddings { embeddings: Vec<Vec<f32>> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbedResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbedResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
            EmbedResponse::Embeddings { embeddings } => embeddings,
        }
    }
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let url = Url::parse(&config.url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }

    fn validate_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        if let Some(mismatch) = embeddings.iter().find(|vec| vec.len() != self.dimension) {
            return Err(Error::EmbeddingOther(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Keep the provider's body: it usually names the actual problem
            // (bad model, over-length input, quota)
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        let embeddings = parsed.into_embeddings();
        self.validate_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            url: format!("{}/v1/embeddings", server.uri()),
            dimension,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_parses_openai_style_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "embedding": [0.1, 0.2, 0.3] },
                    { "embedding": [0.4, 0.5, 0.6] }
                ]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server, 3)).unwrap();
        let out = embedder
            .embed(vec!["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_non_success_status_preserves_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limit exceeded"))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server, 3)).unwrap();
        let err = embedder.embed(vec!["one".to_string()]).await.unwrap_err();
        match err {
            Error::Embedding { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate limit"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "embedding": [0.1, 0.2] } ]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&server, 3)).unwrap();
        assert!(embedder.embed(vec!["one".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_input_short_circuits() {
        let server = MockServer::start().await;
        // No mock mounted: a request would 404
        let embedder = HttpEmbedder::new(&config_for(&server, 3)).unwrap();
        let out = embedder.embed(Vec::new()).await.unwrap();
        assert!(out.is_empty());
    }
}
