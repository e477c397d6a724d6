use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::providers::traits::EmbeddingProvider;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Hosted sentence-transformer embeddings (384 dims for MiniLM-L6-v2).
#[derive(Clone)]
pub struct HuggingFaceEmbedding {
    api_token: String,
    client: Client,
    api_url: String,
    model: String,
    dimension: usize,
}

impl HuggingFaceEmbedding {
    pub fn new(api_token: String) -> Self {
        let model = env::var("HF_EMBEDDING_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_url = env::var("HF_EMBEDDING_URL").unwrap_or_else(|_| {
            format!(
                "https://router.huggingface.co/hf-inference/models/{}/pipeline/feature-extraction",
                model
            )
        });
        let dimension = env::var("HF_EMBEDDING_DIM")
            .ok()
            .and_then(|d| d.parse().ok())
            .unwrap_or(384);

        Self {
            api_token,
            client: Client::new(),
            api_url,
            model,
            dimension,
        }
    }
}

/// The endpoint answers with one vector per input, or with token-level
/// vectors when the model isn't a sentence-transformer; the latter are
/// mean-pooled.
pub fn parse_feature_response(value: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let rows = value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid embedding response format: {}", value))?;

    let embeddings = rows
        .iter()
        .map(|row| match row.as_array() {
            Some(items) if items.first().map_or(false, Value::is_array) => {
                mean_pool(items)
            }
            Some(items) => Ok(to_floats(items)),
            None => Err(anyhow!("Invalid embedding row: {}", row)),
        })
        .collect::<Result<Vec<_>>>()?;

    if embeddings.len() != expected {
        return Err(anyhow!(
            "Embedding service returned {} vectors for {} inputs",
            embeddings.len(),
            expected
        ));
    }
    Ok(embeddings)
}

fn to_floats(items: &[Value]) -> Vec<f32> {
    items
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn mean_pool(tokens: &[Value]) -> Result<Vec<f32>> {
    let vectors: Vec<Vec<f32>> = tokens
        .iter()
        .filter_map(|t| t.as_array().map(|a| to_floats(a)))
        .collect();

    let width = vectors.first().map(Vec::len).unwrap_or(0);
    if width == 0 || vectors.iter().any(|v| v.len() != width) {
        return Err(anyhow!("Ragged token embeddings in response"));
    }

    let mut pooled = vec![0.0f32; width];
    for vector in &vectors {
        for (acc, x) in pooled.iter_mut().zip(vector) {
            *acc += x;
        }
    }
    let count = vectors.len() as f32;
    pooled.iter_mut().for_each(|x| *x /= count);
    Ok(pooled)
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedding {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings.pop().ok_or_else(|| anyhow!("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&json!({
                "inputs": texts,
                "options": { "wait_for_model": true }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Embedding request failed: Status {}, Body: {}", status, error_text));
        }

        let response_json: Value = response.json().await?;
        parse_feature_response(&response_json, texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sentence_vectors() {
        let value = json!([[0.1, 0.2], [0.3, 0.4]]);
        let parsed = parse_feature_response(&value, 2).unwrap();
        assert_eq!(parsed, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn mean_pools_token_vectors() {
        let value = json!([[[1.0, 3.0], [3.0, 5.0]]]);
        let parsed = parse_feature_response(&value, 1).unwrap();
        assert_eq!(parsed, vec![vec![2.0, 4.0]]);
    }

    #[test]
    fn rejects_count_mismatch_and_errors() {
        assert!(parse_feature_response(&json!([[0.1]]), 2).is_err());
        assert!(parse_feature_response(&json!({ "error": "loading" }), 1).is_err());
    }
}
