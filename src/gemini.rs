//! Gemini `generateContent` client.
//!
//! Sends a single user query with a fixed system instruction, sampling
//! temperature and tool declarations. When the model asks for a tool call
//! the client runs it locally and resubmits the conversation until the
//! model answers in text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AppConfig, DEFAULT_MAX_TOOL_ROUNDS};
use crate::tools::{FunctionDeclaration, Toolbox, WeatherTool};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to reach model API: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("model API returned no candidates")]
    NoCandidates,

    #[error("model kept requesting tools after {0} rounds")]
    ToolRoundsExceeded(usize),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

/// Fixed parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub system_instruction: String,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Anything that can turn a query into model text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, query: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    /// Fields we don't model (thought signatures etc.) round-trip untouched.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    system_instruction: SystemInstruction<'a>,
    generation_config: WireGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct WireGenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

impl Candidate {
    fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    fn function_calls(&self) -> Vec<FunctionCall> {
        self.content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.function_call.clone())
            .collect()
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    generation: GenerationConfig,
    toolbox: Toolbox,
    auto_function_calling: bool,
    max_tool_rounds: usize,
}

impl GeminiClient {
    /// Client with the default generation config and the weather tool.
    pub fn new(
        api_key: impl Into<String>,
        model: impl AsRef<str>,
        base_url: impl AsRef<str>,
    ) -> Self {
        Self::with_http(reqwest::Client::new(), api_key, model, base_url)
    }

    fn with_http(
        http: reqwest::Client,
        api_key: impl Into<String>,
        model: impl AsRef<str>,
        base_url: impl AsRef<str>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            endpoint: format!(
                "{}/models/{}:generateContent",
                base_url.as_ref().trim_end_matches('/'),
                model.as_ref()
            ),
            generation: GenerationConfig::default(),
            toolbox: Toolbox::new().with_tool(WeatherTool),
            auto_function_calling: true,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self::with_http(http, &cfg.api_key, &cfg.model, &cfg.base_url)
            .with_auto_function_calling(cfg.auto_function_calling)
            .with_max_tool_rounds(cfg.max_tool_rounds))
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = toolbox;
        self
    }

    pub fn with_auto_function_calling(mut self, enabled: bool) -> Self {
        self.auto_function_calling = enabled;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body<'a>(&'a self, contents: &'a [Content]) -> GenerateContentRequest<'a> {
        let tools = if self.toolbox.is_empty() {
            Vec::new()
        } else {
            vec![WireTool {
                function_declarations: self.toolbox.declarations(),
            }]
        };

        GenerateContentRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: [TextPart {
                    text: &self.generation.system_instruction,
                }],
            },
            generation_config: WireGenerationConfig {
                temperature: self.generation.temperature,
            },
            tools,
        }
    }

    async fn send(&self, contents: &[Content]) -> Result<Candidate, ModelError> {
        debug!(endpoint = %self.endpoint, turns = contents.len(), "sending generateContent");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(contents))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response body>".to_string());
            return Err(ModelError::Status { status, body });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or(ModelError::NoCandidates)?;
        debug!(finish_reason = ?candidate.finish_reason, "received candidate");
        Ok(candidate)
    }

    fn run_tool(&self, call: &FunctionCall) -> Part {
        let response = match self.toolbox.dispatch(&call.name, &call.args) {
            Ok(result) => json!({ "result": result }),
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call failed");
                json!({ "error": err.to_string() })
            }
        };

        Part {
            function_response: Some(FunctionResponse {
                name: call.name.clone(),
                response,
            }),
            ..Part::default()
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, query: &str) -> Result<String, ModelError> {
        let mut contents = vec![Content::user_text(query)];

        for round in 0..=self.max_tool_rounds {
            let candidate = self.send(&contents).await?;
            let calls = candidate.function_calls();

            if calls.is_empty() || !self.auto_function_calling {
                return Ok(candidate.text());
            }
            if round == self.max_tool_rounds {
                break;
            }

            debug!(round, calls = calls.len(), "executing requested tools");
            let results: Vec<Part> = calls.iter().map(|call| self.run_tool(call)).collect();

            let mut model_turn = candidate.content.unwrap_or_else(|| Content {
                role: String::new(),
                parts: Vec::new(),
            });
            model_turn.role = "model".to_string();
            contents.push(model_turn);
            contents.push(Content {
                role: "user".to_string(),
                parts: results,
            });
        }

        Err(ModelError::ToolRoundsExceeded(self.max_tool_rounds))
    }
}
