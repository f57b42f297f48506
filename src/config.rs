#![allow(dead_code)]
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub runner: RunnerConfig,

    #[validate(nested)]
    pub context: ContextConfig,

    #[validate(nested)]
    pub store: StoreConfig,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,

    #[validate(nested)]
    pub llm: LlmConfig,
}

/// HTTP server configuration for the thin insights entry point.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[serde(default)]
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("failed to parse socket address")
    }
}

/// Conversation Runner budgets (§4.F inputs).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RunnerConfig {
    #[serde(default = "default_max_iterations")]
    #[validate(range(min = 1, max = 100))]
    pub max_iterations: usize,

    #[serde(default = "default_iteration_timeout_ms")]
    pub iteration_timeout_ms: u64,

    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,

    #[serde(default = "default_conversation_token_limit")]
    pub conversation_token_limit: usize,

    #[serde(default = "default_tokens_per_char")]
    pub tokens_per_char: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            iteration_timeout_ms: default_iteration_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
            conversation_token_limit: default_conversation_token_limit(),
            tokens_per_char: default_tokens_per_char(),
        }
    }
}

/// Context Assembler time budgets (§4.D).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ContextConfig {
    #[serde(default = "default_sync_budget_ms")]
    pub sync_budget_ms: u64,

    #[serde(default = "default_background_budget_ms")]
    pub background_budget_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            sync_budget_ms: default_sync_budget_ms(),
            background_budget_ms: default_background_budget_ms(),
        }
    }
}

/// Telemetry Store Adapter retry configuration (§4.A).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StoreConfig {
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 0, max = 10))]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_max_pool_connections")]
    #[validate(range(min = 1, max = 5))]
    pub max_pool_connections: u32,

    #[serde(default = "default_model_cache_ttl_hours")]
    pub model_cache_ttl_hours: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_pool_connections: default_max_pool_connections(),
            model_cache_ttl_hours: default_model_cache_ttl_hours(),
        }
    }
}

/// Logging/observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: true,
        }
    }
}

/// Transport configuration for the generic HTTP [`LlmClient`](crate::runner::LlmClient).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LlmConfig {
    #[validate(length(min = 1))]
    pub endpoint: String,

    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/generate".to_string(),
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

fn default_llm_timeout_ms() -> u64 {
    20_000
}

fn default_max_iterations() -> usize {
    10
}
fn default_iteration_timeout_ms() -> u64 {
    25_000
}
fn default_total_timeout_ms() -> u64 {
    58_000
}
fn default_conversation_token_limit() -> usize {
    60_000
}
fn default_tokens_per_char() -> f64 {
    0.25
}
fn default_sync_budget_ms() -> u64 {
    5_000
}
fn default_background_budget_ms() -> u64 {
    45_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    200
}
fn default_max_pool_connections() -> u32 {
    5
}
fn default_model_cache_ttl_hours() -> i64 {
    24
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            runner: RunnerConfig::default(),
            context: ContextConfig::default(),
            store: StoreConfig::default(),
            telemetry: TelemetryConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Precedence (later overrides earlier):
    /// 1. compiled-in defaults
    /// 2. `config/default.toml`
    /// 3. environment variables with the `BIE__` prefix (e.g.
    ///    `BIE__RUNNER__MAX_ITERATIONS`)
    pub fn load() -> Result<Self> {
        let figment = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::default(),
        ))
        .merge(Toml::file("config/default.toml"))
        .merge(Env::prefixed("BIE__").split("__"));

        let config: AppConfig = figment.extract().context("failed to parse configuration")?;
        config.validate().context("configuration validation failed")?;
        Ok(config)
    }
}

pub type Config = AppConfig;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_satisfy_validation() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn socket_addr_parses() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn runner_budgets_match_spec_defaults() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.iteration_timeout_ms, 25_000);
        assert_eq!(cfg.total_timeout_ms, 58_000);
        assert_eq!(cfg.conversation_token_limit, 60_000);
    }
}
