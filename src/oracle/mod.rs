//! ═══════════════════════════════════════════════════════════════════════════════
//! ORACLE — External Decision Source
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! The oracle receives a structured state summary and returns one action:
//!
//!   {"action":"SIMULATE","parameters":{"K":f64},"reasoning":str}
//!   {"action":"TERMINATE","reasoning":str}
//!   {"action":"REPORT","report_content":str}
//!
//! Implementations:
//! - `MockOracle` — deterministic phase-appropriate stubs, no network
//! - `LlmOracle` — Gemini / Anthropic over blocking HTTP
//!
//! Physics never trusts the oracle: every proposed K is clamped by the
//! orchestrator before it reaches the simulator.
//! ═══════════════════════════════════════════════════════════════════════════════

pub mod cache;
pub mod llm;
pub mod mock;
pub mod rate_limit;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::OracleConfig;
use crate::error::ConfigError;
use crate::phase::AuditPhase;
use crate::telemetry::OracleSignal;

pub use cache::ResponseCache;
pub use llm::LlmOracle;
pub use mock::MockOracle;
pub use rate_limit::{Clock, ManualClock, RateLimiter, SystemClock};

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure talking to the oracle
#[derive(Debug, Clone)]
pub enum OracleError {
    /// No API key configured
    MissingCredentials,
    /// Network or client construction failure
    Transport(String),
    /// Non-success HTTP status
    Http { status: u16, message: String },
    /// Rate or quota limit reported by the provider
    QuotaExhausted(String),
    /// Reply carried no text
    EmptyResponse,
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::MissingCredentials => write!(f, "no oracle credentials configured"),
            OracleError::Transport(msg) => write!(f, "transport failure: {}", msg),
            OracleError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
            OracleError::QuotaExhausted(msg) => write!(f, "quota exhausted: {}", msg),
            OracleError::EmptyResponse => write!(f, "empty response"),
        }
    }
}

impl std::error::Error for OracleError {}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Transport(err.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROVIDERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Where decisions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    /// Deterministic stubs
    Mock,
    /// Google Gemini
    Gemini,
    /// Anthropic Claude
    Anthropic,
}

impl OracleProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Gemini => "gemini-1.5-flash",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Mock => "",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }
}

impl fmt::Display for OracleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mock => write!(f, "mock"),
            Self::Gemini => write!(f, "gemini"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for OracleProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" | "none" | "offline" => Ok(Self::Mock),
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

/// One structured action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "UPPERCASE")]
pub enum Decision {
    Simulate { k: f64, reasoning: String },
    Terminate { reasoning: String },
    Report { content: String },
    /// Action string outside the contract; ends the audit loop
    Unrecognized { action: String },
}

impl Decision {
    pub fn simulate(k: f64, reasoning: impl Into<String>) -> Self {
        Decision::Simulate {
            k,
            reasoning: reasoning.into(),
        }
    }

    pub fn terminate(reasoning: impl Into<String>) -> Self {
        Decision::Terminate {
            reasoning: reasoning.into(),
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Decision::Simulate { .. } => "SIMULATE",
            Decision::Terminate { .. } => "TERMINATE",
            Decision::Report { .. } => "REPORT",
            Decision::Unrecognized { action } => action,
        }
    }

    pub fn is_simulate(&self) -> bool {
        matches!(self, Decision::Simulate { .. })
    }
}

/// Physical snapshot sent with every request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// External entropy I
    pub entropy: f64,
    /// Current base K
    pub k_base: f64,
    /// K after the constraint gate
    pub k_initial: f64,
    pub stock: f64,
    pub liquidity: f64,
    pub capital: f64,
    pub theta_max: f64,
    /// Window the next K will be clamped into
    pub k_window: (f64, f64),
}

/// Everything the oracle is allowed to see
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    pub phase: AuditPhase,
    pub phase_rationale: String,
    pub system_description: String,
    pub snapshot: SystemSnapshot,
    pub signal: OracleSignal,
}

/// A source of decisions
pub trait DecisionOracle {
    fn name(&self) -> &str;

    /// Mock oracles are never rate limited or cached
    fn is_mock(&self) -> bool {
        false
    }

    fn decide(&mut self, request: &OracleRequest) -> Result<Decision, OracleError>;
}

/// Build the configured oracle; anything without credentials runs in mock mode
pub fn from_config(config: &OracleConfig) -> Box<dyn DecisionOracle> {
    if config.provider == OracleProvider::Mock {
        return Box::new(MockOracle::new());
    }
    match LlmOracle::new(config) {
        Ok(oracle) => Box::new(oracle),
        Err(e) => {
            tracing::warn!(provider = %config.provider, error = %e, "oracle unavailable, running in mock mode");
            Box::new(MockOracle::new())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// First balanced `{…}` object in free text (prose, code fences, etc.)
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse an oracle reply; malformed replies become TERMINATE with a diagnostic
///
/// `fallback_k` is used when SIMULATE carries no usable K.
pub fn parse_decision(text: &str, fallback_k: f64) -> Decision {
    let Some(json) = extract_json(text) else {
        return Decision::terminate("Oracle reply contained no JSON object");
    };
    let value: serde_json::Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => return Decision::terminate(format!("Unparseable oracle reply: {}", e)),
    };
    let Some(action) = value.get("action").and_then(|a| a.as_str()) else {
        return Decision::terminate("Oracle reply has no 'action' field");
    };

    let reasoning = value
        .get("reasoning")
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .to_string();

    match action.trim().to_uppercase().as_str() {
        "SIMULATE" => {
            let k = value
                .pointer("/parameters/K")
                .or_else(|| value.get("K"))
                .and_then(number)
                .filter(|k| k.is_finite())
                .unwrap_or(fallback_k);
            Decision::Simulate { k, reasoning }
        }
        "TERMINATE" => Decision::Terminate { reasoning },
        "REPORT" => Decision::Report {
            content: value
                .get("report_content")
                .and_then(|c| c.as_str())
                .map(str::to_string)
                .unwrap_or(reasoning),
        },
        _ => Decision::Unrecognized {
            action: action.to_string(),
        },
    }
}

/// Number or numeric string
fn number(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
