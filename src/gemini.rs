use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Fixed instruction sent with every request. Never user-editable.
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful Data Structures and Algorithms (DSA) Instructor. You will give a simple and brief explanation of any topic related to data structures and algorithms, optionally with concise examples or code snippets in javascript. If a user asks a question outside of DSA, politely respond: \"I am not able to answer this question, I can only answer questions related to data structures and algorithms.\" If a user greets you with hello, hi, or how are you?, reply with: Hii, how can I help you?. Keep all answers short, clear, and beginner-friendly. When providing code, wrap it in Markdown code blocks.";

/// Path the proxy exposes for generation requests
pub const GENERATE_PATH: &str = "/v1/generate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

// The endpoint accepts a single part object here rather than a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: TextPart,
}

impl SystemInstruction {
    pub fn fixed() -> Self {
        Self {
            parts: TextPart {
                text: SYSTEM_INSTRUCTION.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "systemInstruction", default = "SystemInstruction::fixed")]
    pub system_instruction: SystemInstruction,
}

impl GenerateRequest {
    /// Request carrying `utterance` as its sole content part
    pub fn for_utterance(utterance: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![TextPart {
                    text: utterance.to_string(),
                }],
            }],
            system_instruction: SystemInstruction::fixed(),
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The request never produced a response (connect, IO, body read)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint answered with a non-2xx status
    #[error("generation endpoint returned status {0}")]
    Status(u16),
    /// The body was not the expected candidate/content/parts shape
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The task running the request panicked or was cancelled
    #[error("generation task aborted: {0}")]
    Aborted(String),
}

/// Anything that can turn an utterance into a reply
#[async_trait]
pub trait Generate: Send + Sync {
    async fn generate(&self, utterance: &str) -> Result<String, GenerationError>;
}

/// Extract the first candidate's first text part from a response body
pub fn interpret_response(body: &str) -> Result<String, GenerationError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Malformed(e.to_string()))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::Malformed("no candidates".to_string()))?;

    candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(|| GenerationError::Malformed("candidate has no text part".to_string()))
}

/// Client for the generation proxy. Holds no credentials.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(proxy_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}{}", proxy_url.trim_end_matches('/'), GENERATE_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, utterance: &str) -> Result<String, GenerationError> {
        let request = GenerateRequest::for_utterance(utterance);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        interpret_response(&body)
    }
}

#[async_trait]
impl Generate for GeminiClient {
    async fn generate(&self, utterance: &str) -> Result<String, GenerationError> {
        let result = self.request(utterance).await;
        match &result {
            Ok(reply) => tracing::debug!(chars = reply.len(), "generation succeeded"),
            Err(e) => tracing::error!(endpoint = %self.endpoint, error = %e, "generation request failed"),
        }
        result
    }
}
