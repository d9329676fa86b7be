use serde::{Deserialize, Serialize};

/// Ollama embedding request
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    /// Model name (e.g., "nomic-embed-text", "all-minilm")
    pub model: String,

    /// Text to embed
    pub prompt: String,
}

/// Ollama embedding response
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    /// Pooled embedding
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// Ollama `/api/tags` response, used to check the model is pulled
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,
}

impl TagsResponse {
    /// Whether `model` is pulled, with or without an explicit `:tag`
    pub fn has_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| {
            m.name == model || m.name.split(':').next() == Some(model)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_model_ignores_default_tag() {
        let tags: TagsResponse = serde_json::from_str(
            r#"{"models":[{"name":"all-minilm:latest"},{"name":"llama3.2:3b"}]}"#,
        )
        .unwrap();
        assert!(tags.has_model("all-minilm"));
        assert!(tags.has_model("all-minilm:latest"));
        assert!(!tags.has_model("nomic-embed-text"));
    }

    #[test]
    fn test_embed_response_without_embedding() {
        let resp: EmbedResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.embedding.is_empty());
    }
}
