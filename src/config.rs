//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before resolving API keys.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Helius (address activity) configuration
    pub helius: HeliusConfig,
    /// Compliance score service configuration
    pub compliance: ComplianceConfig,
    /// Narrative generator configuration
    pub narrative: NarrativeConfig,
    /// Analysis limits
    pub analysis: AnalysisConfig,
    /// Retry policy for collaborator calls
    pub retry: RetryConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// SSE keep-alive interval
    #[serde(with = "humantime_serde")]
    pub keep_alive_interval: Duration,
    /// Stage events buffered per request before the pipeline waits on the client
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            keep_alive_interval: Duration::from_secs(15),
            event_buffer: 16,
        }
    }
}

/// Helius API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeliusConfig {
    /// API key (supports `env:VAR_NAME`)
    pub api_key: Option<String>,
    /// Enhanced transactions API base URL
    pub api_url: String,
    /// JSON-RPC endpoint (the API key is appended as a query parameter)
    pub rpc_url: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            api_key: Some("env:HELIUS_API_KEY".to_string()),
            api_url: "https://api.helius.xyz/v0".to_string(),
            rpc_url: "https://mainnet.helius-rpc.com".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Compliance score service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// API key (supports `env:VAR_NAME`)
    pub api_key: Option<String>,
    /// Risk score endpoint
    pub url: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            api_key: Some("env:METASLEUTH_API_KEY".to_string()),
            url: "https://aml.blocksec.com/address-compliance/api/v3/risk-score".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Narrative generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// API key (supports `env:VAR_NAME`)
    pub api_key: Option<String>,
    /// Chat completions endpoint
    pub url: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            api_key: Some("env:MISTRAL_API_KEY".to_string()),
            url: "https://api.mistral.ai/v1/chat/completions".to_string(),
            model: "mistral-medium".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Analysis limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// History size when the request does not specify one
    pub default_limit: usize,
    /// Largest history size a request may ask for
    pub max_limit: usize,
    /// Transactions summarized into the narrative context
    pub context_tx_cap: usize,
    /// Transactions echoed back in the final result
    pub recent_tx_cap: usize,
    /// Distinct token mints looked up per request
    pub max_metadata_lookups: usize,
    /// Pause between stages (lets slow clients render progress)
    #[serde(with = "humantime_serde")]
    pub stage_delay: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            context_tx_cap: 25,
            recent_tx_cap: 10,
            max_metadata_lookups: 20,
            stage_delay: Duration::ZERO,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum attempts (including the first)
    pub max_attempts: u32,
    /// Initial backoff
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("SENTRYSOL_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.validate()?;

        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns an error when limits are inconsistent.
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if analysis.max_limit == 0 {
            return Err(Error::Config("analysis.max_limit must be positive".into()));
        }
        if analysis.default_limit == 0 || analysis.default_limit > analysis.max_limit {
            return Err(Error::Config(format!(
                "analysis.default_limit must be within 1..={}",
                analysis.max_limit
            )));
        }
        if self.server.event_buffer == 0 {
            return Err(Error::Config("server.event_buffer must be positive".into()));
        }
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }
}

/// Resolve an API key reference: literal value or `env:VAR_NAME`.
///
/// Returns `None` for a missing key, an unset variable, or an empty value.
#[must_use]
pub fn resolve_secret(value: Option<&str>) -> Option<String> {
    let value = value?;
    let resolved = match value.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).ok()?,
        None => value.to_string(),
    };
    (!resolved.trim().is_empty()).then_some(resolved)
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.default_limit, 20);
        assert_eq!(config.analysis.max_limit, 100);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn load_merges_yaml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 9100\nanalysis:\n  default_limit: 50\n  stage_delay: 100ms\nretry:\n  max_backoff: 1m"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.analysis.default_limit, 50);
        assert_eq!(config.analysis.stage_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(60));
        assert_eq!(config.analysis.max_limit, 100);
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/sentrysol.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn validate_rejects_default_above_max() {
        let mut config = Config::default();
        config.analysis.default_limit = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_secret_handles_literals_and_blanks() {
        assert_eq!(resolve_secret(Some("abc")), Some("abc".to_string()));
        assert_eq!(resolve_secret(Some("   ")), None);
        assert_eq!(resolve_secret(None), None);
        assert_eq!(
            resolve_secret(Some("env:SENTRYSOL_TEST_SURELY_UNSET_VAR")),
            None
        );
    }
}
