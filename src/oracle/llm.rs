//! ═══════════════════════════════════════════════════════════════════════════════
//! LLM ORACLE — Gemini / Anthropic Decision Client
//! ═══════════════════════════════════════════════════════════════════════════════
//! Renders the phase prompt, sends it over blocking HTTP, pulls the first JSON
//! object out of the reply and parses it into a `Decision`.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{parse_decision, Decision, DecisionOracle, OracleError, OracleProvider, OracleRequest};
use crate::config::OracleConfig;

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE FORMATS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiReplyContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    text: Option<String>,
}

/// Error body shared closely enough by both providers
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPT
// ═══════════════════════════════════════════════════════════════════════════════

const SYSTEM_PROMPT: &str = "You are a structural-fragility auditor. You search for the minimum \
response capacity K that keeps an organisation's entropy debt below its collapse threshold. \
You never invent numbers: physics runs the simulations, you only choose the next K. \
Reply with exactly one JSON object and nothing else.";

/// Phase prompt for one decision
pub fn render_prompt(request: &OracleRequest) -> String {
    let snapshot = serde_json::to_string_pretty(&request.snapshot).unwrap_or_default();
    let signal = serde_json::to_string_pretty(&request.signal).unwrap_or_default();
    let (k_lo, k_hi) = request.snapshot.k_window;

    format!(
        "PHASE: {phase}\n\
         ROLE: {rationale}\n\n\
         SYSTEM:\n{description}\n\n\
         PHYSICAL STATE:\n{snapshot}\n\n\
         EXPERIMENT SIGNAL:\n{signal}\n\n\
         Allowed actions:\n\
         {{\"action\":\"SIMULATE\",\"parameters\":{{\"K\":<number in [{k_lo:.2}, {k_hi:.2}]>}},\"reasoning\":\"...\"}}\n\
         {{\"action\":\"TERMINATE\",\"reasoning\":\"...\"}}\n\
         {{\"action\":\"REPORT\",\"report_content\":\"...\"}}\n",
        phase = request.phase,
        rationale = request.phase_rationale,
        description = request.system_description,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// HTTP-backed oracle
pub struct LlmOracle {
    client: Client,
    provider: OracleProvider,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
    name: String,
    last_latency: Option<Duration>,
}

impl LlmOracle {
    /// Fails with `MissingCredentials` when no key is configured
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(OracleError::MissingCredentials)?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let model = config.model_name().to_string();
        let base = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_base_url().to_string());
        let endpoint = match config.provider {
            OracleProvider::Gemini => {
                format!("{}/v1beta/models/{}:generateContent", base.trim_end_matches('/'), model)
            }
            OracleProvider::Anthropic => format!("{}/v1/messages", base.trim_end_matches('/')),
            OracleProvider::Mock => return Err(OracleError::MissingCredentials),
        };

        Ok(Self {
            client,
            provider: config.provider,
            api_key,
            name: format!("{}:{}", config.provider, model),
            model,
            endpoint,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            last_latency: None,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    fn send(&mut self, prompt: &str) -> Result<String, OracleError> {
        let start = Instant::now();
        let response = match self.provider {
            OracleProvider::Gemini => {
                let body = GeminiRequest {
                    system_instruction: GeminiContent {
                        parts: vec![GeminiPart { text: SYSTEM_PROMPT }],
                    },
                    contents: vec![GeminiContent {
                        parts: vec![GeminiPart { text: prompt }],
                    }],
                    generation_config: GeminiGenerationConfig {
                        temperature: self.temperature,
                        max_output_tokens: self.max_tokens,
                        response_mime_type: "application/json",
                    },
                };
                self.client
                    .post(&self.endpoint)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&body)
                    .send()?
            }
            OracleProvider::Anthropic => {
                let body = AnthropicRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    temperature: self.temperature,
                    system: SYSTEM_PROMPT,
                    messages: vec![AnthropicMessage {
                        role: "user",
                        content: prompt,
                    }],
                };
                self.client
                    .post(&self.endpoint)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
                    .send()?
            }
            OracleProvider::Mock => return Err(OracleError::MissingCredentials),
        };
        self.last_latency = Some(start.elapsed());

        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match status.as_u16() {
                429 => OracleError::QuotaExhausted(message),
                401 | 403 => OracleError::MissingCredentials,
                code => OracleError::Http { status: code, message },
            });
        }

        let text = self.extract_text(&body)?;
        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(text)
    }

    fn extract_text(&self, body: &str) -> Result<String, OracleError> {
        let malformed = |e: serde_json::Error| OracleError::Transport(format!("malformed provider reply: {}", e));
        let parts: Vec<String> = match self.provider {
            OracleProvider::Gemini => serde_json::from_str::<GeminiResponse>(body)
                .map_err(malformed)?
                .candidates
                .into_iter()
                .take(1)
                .filter_map(|c| c.content)
                .flat_map(|c| c.parts)
                .filter_map(|p| p.text)
                .collect(),
            OracleProvider::Anthropic => serde_json::from_str::<AnthropicResponse>(body)
                .map_err(malformed)?
                .content
                .into_iter()
                .filter_map(|b| b.text)
                .collect(),
            OracleProvider::Mock => Vec::new(),
        };
        Ok(parts.join("\n"))
    }
}

impl DecisionOracle for LlmOracle {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, request: &OracleRequest) -> Result<Decision, OracleError> {
        let prompt = render_prompt(request);
        let text = self.send(&prompt)?;
        tracing::debug!(
            oracle = %self.name,
            latency_ms = self.last_latency.map(|d| d.as_millis() as u64).unwrap_or(0),
            "oracle replied"
        );
        Ok(parse_decision(&text, request.snapshot.k_base))
    }
}
