//! ═══════════════════════════════════════════════════════════════════════════════
//! CONFIG — Audit Settings and Thresholds
//! ═══════════════════════════════════════════════════════════════════════════════
//! Precedence: defaults ← `<config_dir>/iso-entropy/config.json` ← environment.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IsoResult};
use crate::oracle::OracleProvider;
use crate::physics::SimulationParams;
use crate::stats::StabilityCriteria;

/// What to do when the oracle fails mid-audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Switch to mock decisions for the rest of the audit
    Mock,
    /// Treat the failure as TERMINATE
    Terminate,
}

/// Decision oracle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: OracleProvider,

    /// Model name; provider default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Calls allowed per rolling window
    pub requests_per_window: u32,
    pub window_secs: u64,
    /// Minimum spacing between two calls
    pub min_interval_secs: u64,

    pub fallback: FallbackPolicy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::Gemini,
            model: None,
            api_key: None,
            endpoint: None,
            timeout_secs: 60,
            max_tokens: 1024,
            temperature: 0.2,
            requests_per_window: 5,
            window_secs: 60,
            min_interval_secs: 12,
            fallback: FallbackPolicy::Mock,
        }
    }
}

impl OracleConfig {
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Main audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Upper bound on audit loop iterations
    pub max_iterations: u32,

    /// Trials per primary/forced experiment
    pub runs: u32,

    /// Trials per replica
    pub replica_runs: u32,

    /// Weeks simulated per trial
    pub time_steps: u32,

    pub dissipation_alpha: f64,

    /// Largest K move away from the base K per decision
    pub max_k_step: f64,
    pub k_floor: f64,
    pub k_ceiling: f64,

    /// Probes in the forced re-exploration protocol
    pub forced_attempts: u32,
    /// ΔK between forced probes
    pub forced_k_step: f64,
    /// Forced probes and accessible K stay within K0 × this…
    pub max_forced_factor: f64,
    /// …or within K0 + this
    pub max_forced_delta: f64,

    /// K − I must exceed this for a robust verdict
    pub min_margin: f64,

    pub required_replicas: u32,

    /// Log entries kept before compaction
    pub compaction_threshold: usize,

    pub stability: StabilityCriteria,

    /// Fixed seed; `None` draws from the OS
    pub seed: Option<u64>,

    pub oracle: OracleConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            runs: 500,
            replica_runs: 1000,
            time_steps: 52,
            dissipation_alpha: 0.15,
            max_k_step: 0.75,
            k_floor: 0.1,
            k_ceiling: 10.0,
            forced_attempts: 2,
            forced_k_step: 0.25,
            max_forced_factor: 1.5,
            max_forced_delta: 0.5,
            min_margin: 0.2,
            required_replicas: 2,
            compaction_threshold: 10,
            stability: StabilityCriteria::default(),
            seed: None,
            oracle: OracleConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Load config from file and environment
    pub fn load() -> IsoResult<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ISO_ENTROPY_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            self.oracle.api_key = Some(key);
        }
        if let Some(provider) = lookup("ISO_ENTROPY_PROVIDER") {
            self.oracle.provider = provider.parse()?;
        }
        if let Some(model) = lookup("ISO_ENTROPY_MODEL") {
            self.oracle.model = Some(model);
        }
        if let Some(seed) = lookup("ISO_ENTROPY_SEED") {
            let seed = seed.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "seed".to_string(),
                message: format!("'{}' is not an unsigned integer", seed),
            })?;
            self.seed = Some(seed);
        }
        Ok(())
    }

    /// Reject settings the audit loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: String| ConfigError::InvalidValue {
            field: field.to_string(),
            message,
        };

        if self.runs == 0 {
            return Err(invalid("runs", "must be positive".to_string()));
        }
        if self.replica_runs == 0 {
            return Err(invalid("replica_runs", "must be positive".to_string()));
        }
        if self.time_steps == 0 {
            return Err(invalid("time_steps", "must be positive".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be positive".to_string()));
        }
        if !(self.k_floor > 0.0 && self.k_floor < self.k_ceiling && self.k_ceiling.is_finite()) {
            return Err(invalid(
                "k_floor",
                format!("need 0 < k_floor < k_ceiling, got {} / {}", self.k_floor, self.k_ceiling),
            ));
        }
        if !(self.max_k_step > 0.0 && self.max_k_step.is_finite()) {
            return Err(invalid("max_k_step", format!("must be positive, got {}", self.max_k_step)));
        }
        if !(self.dissipation_alpha >= 0.0 && self.dissipation_alpha.is_finite()) {
            return Err(invalid(
                "dissipation_alpha",
                format!("must be non-negative, got {}", self.dissipation_alpha),
            ));
        }
        if !(self.max_forced_factor >= 1.0 && self.max_forced_delta >= 0.0 && self.forced_k_step > 0.0) {
            return Err(invalid(
                "forced",
                "need max_forced_factor ≥ 1, max_forced_delta ≥ 0, forced_k_step > 0".to_string(),
            ));
        }
        let s = &self.stability;
        let in_unit = |x: f64| x > 0.0 && x < 1.0;
        if !(in_unit(s.stable_threshold) && in_unit(s.marginal_threshold)) {
            return Err(invalid("stability", "thresholds must lie in (0, 1)".to_string()));
        }
        if s.stable_threshold >= s.marginal_threshold {
            return Err(invalid(
                "stability",
                format!(
                    "stable_threshold {} must be below marginal_threshold {}",
                    s.stable_threshold, s.marginal_threshold
                ),
            ));
        }
        if !(s.z > 0.0 && s.z.is_finite()) {
            return Err(invalid("stability.z", format!("must be positive, got {}", s.z)));
        }
        if self.oracle.requests_per_window == 0 {
            return Err(invalid("oracle.requests_per_window", "must be positive".to_string()));
        }
        Ok(())
    }

    /// Default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("iso-entropy")
            .join("config.json")
    }

    /// Save config to file
    pub fn save(&self) -> IsoResult<PathBuf> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Monte Carlo settings for a primary or forced experiment
    pub fn simulation_params(&self) -> SimulationParams {
        SimulationParams {
            runs: self.runs,
            time_steps: self.time_steps,
            alpha: self.dissipation_alpha,
            seed: self.seed,
            ..SimulationParams::default()
        }
    }

    /// Monte Carlo settings for a replica
    pub fn replica_params(&self) -> SimulationParams {
        SimulationParams {
            runs: self.replica_runs,
            ..self.simulation_params()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = AuditConfig::default();
        assert_eq!(c.max_iterations, 10);
        assert_eq!(c.runs, 500);
        assert_eq!(c.replica_runs, 1000);
        assert_eq!(c.forced_attempts, 2);
        assert_eq!(c.required_replicas, 2);
        assert_eq!(c.max_k_step, 0.75);
        assert_eq!(c.stability.stable_threshold, 0.05);
        assert_eq!(c.stability.marginal_threshold, 0.15);
        assert_eq!(c.oracle.requests_per_window, 5);
        assert_eq!(c.oracle.min_interval_secs, 12);
        assert_eq!(c.oracle.fallback, FallbackPolicy::Mock);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut c = AuditConfig::default();
        c.apply_env(env(&[
            ("GEMINI_API_KEY", "g-key"),
            ("ISO_ENTROPY_PROVIDER", "anthropic"),
            ("ISO_ENTROPY_SEED", "42"),
        ]))
        .unwrap();
        assert_eq!(c.oracle.api_key.as_deref(), Some("g-key"));
        assert_eq!(c.oracle.provider, OracleProvider::Anthropic);
        assert_eq!(c.oracle.model_name(), "claude-sonnet-4-20250514");
        assert_eq!(c.seed, Some(42));

        // the specific key wins over the provider-named one
        c.apply_env(env(&[("ISO_ENTROPY_API_KEY", "i-key"), ("GEMINI_API_KEY", "g-key")]))
            .unwrap();
        assert_eq!(c.oracle.api_key.as_deref(), Some("i-key"));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut c = AuditConfig::default();
        assert!(matches!(
            c.apply_env(env(&[("ISO_ENTROPY_PROVIDER", "openai")])),
            Err(ConfigError::UnknownProvider(_))
        ));
        assert!(matches!(
            c.apply_env(env(&[("ISO_ENTROPY_SEED", "minus one")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let c: AuditConfig = serde_json::from_str(r#"{"runs": 200, "oracle": {"provider": "mock"}}"#).unwrap();
        assert_eq!(c.runs, 200);
        assert_eq!(c.replica_runs, 1000);
        assert_eq!(c.oracle.provider, OracleProvider::Mock);
        assert_eq!(c.oracle.window_secs, 60);
    }

    #[test]
    fn test_validate() {
        let mut c = AuditConfig::default();
        c.runs = 0;
        assert!(c.validate().is_err());

        let mut c = AuditConfig::default();
        c.k_floor = 5.0;
        c.k_ceiling = 1.0;
        assert!(c.validate().is_err());

        let mut c = AuditConfig::default();
        c.stability.stable_threshold = 0.2;
        assert!(c.validate().is_err());

        let mut c = AuditConfig::default();
        c.stability.marginal_threshold = 1.5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_params() {
        let mut c = AuditConfig::default();
        c.seed = Some(7);
        let p = c.simulation_params();
        assert_eq!(p.runs, 500);
        assert_eq!(p.time_steps, 52);
        assert_eq!(p.seed, Some(7));
        let r = c.replica_params();
        assert_eq!(r.runs, 1000);
        assert_eq!(r.alpha, 0.15);
    }
}
