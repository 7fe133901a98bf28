//! Gemini API client for the model-backed stages
//!
//! Thin structured-output wrapper over the generateContent endpoint.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::PipelineError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| {
                PipelineError::ConfigError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
        })
    }

    /// Generate a raw text response from Gemini.
    pub async fn generate(&self, system_prompt: &str, query: &str) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: query.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 4096,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
        };

        info!("Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                PipelineError::CollaboratorUnavailable(format!("Gemini request error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(PipelineError::CollaboratorUnavailable(format!(
                "Gemini returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            PipelineError::CollaboratorMalformed(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                PipelineError::CollaboratorMalformed("Empty response from Gemini".to_string())
            })?;

        Ok(answer)
    }
}

/// Strip an optional markdown ```json fence and parse the remainder.
/// Model responses routinely wrap structured output in a fenced block.
pub fn parse_fenced_json<T: serde::de::DeserializeOwned>(response: &str) -> crate::Result<T> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| {
        PipelineError::CollaboratorMalformed(format!(
            "unparseable structured response: {} | raw={}",
            e, response
        ))
    })
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "Classify this document".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 4096,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "You are a document classifier".to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Classify this document"));
    }

    #[test]
    fn test_parse_fenced_json() {
        #[derive(Deserialize)]
        struct Tiny {
            value: u32,
        }

        let fenced = "```json\n{\"value\": 7}\n```";
        let parsed: Tiny = parse_fenced_json(fenced).unwrap();
        assert_eq!(parsed.value, 7);

        let bare: Tiny = parse_fenced_json("{\"value\": 9}").unwrap();
        assert_eq!(bare.value, 9);
    }

    #[test]
    fn test_parse_fenced_json_malformed() {
        #[derive(Debug, Deserialize)]
        struct Tiny {
            #[allow(dead_code)]
            value: u32,
        }

        let err = parse_fenced_json::<Tiny>("not json at all").unwrap_err();
        assert!(matches!(
            err,
            crate::error::PipelineError::CollaboratorMalformed(_)
        ));
    }
}
