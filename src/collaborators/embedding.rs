//! Embedding collaborators.

use super::error::CollaboratorError;
use super::traits::Embedder;
use crate::vector::math::l2_normalize;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Deterministic feature-hashing embedder.
///
/// Terms (and the camel-case parts of identifiers) are hashed with FNV-1a
/// into signed buckets, weighted by term frequency and length, then L2
/// normalized. Needs no model and is always available.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn fnv1a(term: &str) -> u64 {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        h
    }

    pub fn tokenize(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
            if word.len() < 2 {
                continue;
            }
            let lower = word.to_lowercase();
            let parts = split_camel_case(word);
            if parts.len() > 1 {
                tokens.extend(parts.into_iter().filter(|p| p.len() >= 2));
            }
            tokens.push(lower);
        }
        tokens
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = Self::tokenize(text);
        if tokens.is_empty() {
            return vector;
        }

        let total = tokens.len() as f32;
        for token in &tokens {
            let h = Self::fnv1a(token);
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            let idf = 1.0 + (token.len() as f32).ln();
            vector[bucket] += sign * idf / total;
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// Lowercased pieces of a camel- or snake-case identifier.
pub fn split_camel_case(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in word.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing-embedder"
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/v1/embeddings` client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        if dimension == 0 {
            return Err(CollaboratorError::Configuration(
                "embedding dimension must be positive".to_string(),
            ));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key: None,
            dimension,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(CollaboratorError::Unavailable {
                collaborator: self.name().to_string(),
                message: format!("server returned {}", status),
            });
        }
        let response = response.error_for_status()?;

        let body: EmbeddingResponse = response.json().await?;
        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CollaboratorError::invalid_response(self.name(), "no embedding in response"))?;

        if embedding.len() != self.dimension {
            return Err(CollaboratorError::invalid_response(
                self.name(),
                format!(
                    "expected {} dimensions, got {}",
                    self.dimension,
                    embedding.len()
                ),
            ));
        }
        debug!(model = %self.model, dimension = embedding.len(), "Embedded text");
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "http-embedder"
    }
}
