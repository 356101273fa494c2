//! Configuration management for PoliKG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::errors::AppError;
use crate::reasoning::Pattern;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Graph store (Neo4j) configuration
    #[serde(default)]
    pub graph_store: GraphStoreConfig,

    /// LLM collaborator configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Multi-hop reasoning limits and timeouts
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Requests per second across all clients
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphStoreConfig {
    /// Neo4j HTTP endpoint, e.g. http://localhost:7474
    #[serde(default = "default_graph_url")]
    pub url: String,

    /// Database name
    #[serde(default = "default_graph_database")]
    pub database: String,

    pub user: Option<String>,

    pub password: Option<String>,

    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_graph_timeout")]
    pub timeout_ms: u64,

    /// Retries on transport failures (not on query errors)
    #[serde(default = "default_graph_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Use LLM collaborators; heuristics otherwise
    #[serde(default)]
    pub enabled: bool,

    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// HTTP timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReasoningConfig {
    /// Deadline for one graph query
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Deadline for one stop decision
    #[serde(default = "default_decider_timeout")]
    pub decider_timeout_ms: u64,

    /// Deadline for one hop summary
    #[serde(default = "default_summarizer_timeout")]
    pub summarizer_timeout_ms: u64,

    /// Deadline for the final report
    #[serde(default = "default_composer_timeout")]
    pub composer_timeout_ms: u64,

    /// Prefix of accumulated context handed to the stop decider
    #[serde(default = "default_decider_context_chars")]
    pub decider_context_chars: usize,

    /// Prefix of accumulated context handed to the report composer
    #[serde(default = "default_report_context_chars")]
    pub report_context_chars: usize,

    /// Rows shown to the hop summarizer
    #[serde(default = "default_summary_sample")]
    pub summary_sample_rows: usize,

    /// Row cap of exploration queries
    #[serde(default = "default_explore_limit")]
    pub explore_limit: usize,

    /// Most recent discovered entities kept in state
    #[serde(default = "default_max_discovered")]
    pub max_discovered_entities: usize,

    /// Skip relation types explored in earlier hops
    #[serde(default)]
    pub exclude_explored_relations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_graph_url() -> String { "http://localhost:7474".to_string() }
fn default_graph_database() -> String { "neo4j".to_string() }
fn default_graph_timeout() -> u64 { 2_000 }
fn default_graph_retries() -> u32 { 2 }
fn default_llm_endpoint() -> String { "http://localhost:11434/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "qwen2.5:0.5b".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> usize { 668 }
fn default_llm_timeout() -> u64 { 30 }
fn default_store_timeout() -> u64 { 5_000 }
fn default_decider_timeout() -> u64 { 10_000 }
fn default_summarizer_timeout() -> u64 { 10_000 }
fn default_composer_timeout() -> u64 { 20_000 }
fn default_decider_context_chars() -> usize { 800 }
fn default_report_context_chars() -> usize { 600 }
fn default_summary_sample() -> usize { 3 }
fn default_explore_limit() -> usize { 15 }
fn default_max_discovered() -> usize { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "polikg-reasoner".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
        }
    }
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            url: default_graph_url(),
            database: default_graph_database(),
            user: None,
            password: None,
            timeout_ms: default_graph_timeout(),
            max_retries: default_graph_retries(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout(),
            decider_timeout_ms: default_decider_timeout(),
            summarizer_timeout_ms: default_summarizer_timeout(),
            composer_timeout_ms: default_composer_timeout(),
            decider_context_chars: default_decider_context_chars(),
            report_context_chars: default_report_context_chars(),
            summary_sample_rows: default_summary_sample(),
            explore_limit: default_explore_limit(),
            max_discovered_entities: default_max_discovered(),
            exclude_explored_relations: false,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__GRAPH_STORE__URL=http://neo4j:7474
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Reject deadline combinations that would cut turns short.
    ///
    /// The request timeout must cover a turn in which every call runs to its
    /// deadline, and the store's HTTP timeout must fire before the reasoning
    /// deadline so transport retries can happen.
    pub fn validate(&self) -> crate::errors::Result<()> {
        let budget = self.reasoning.turn_budget(Pattern::longest_plan());
        if self.request_timeout() < budget {
            return Err(AppError::Configuration {
                message: format!(
                    "server.request_timeout_secs ({}s) is shorter than the worst-case turn ({}ms)",
                    self.server.request_timeout_secs,
                    budget.as_millis()
                ),
            });
        }

        if self.graph_store.timeout_ms >= self.reasoning.store_timeout_ms {
            return Err(AppError::Configuration {
                message: format!(
                    "graph_store.timeout_ms ({}) must be below reasoning.store_timeout_ms ({})",
                    self.graph_store.timeout_ms, self.reasoning.store_timeout_ms
                ),
            });
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            graph_store: GraphStoreConfig::default(),
            llm: LlmConfig::default(),
            reasoning: ReasoningConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ReasoningConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn decider_timeout(&self) -> Duration {
        Duration::from_millis(self.decider_timeout_ms)
    }

    pub fn summarizer_timeout(&self) -> Duration {
        Duration::from_millis(self.summarizer_timeout_ms)
    }

    pub fn composer_timeout(&self) -> Duration {
        Duration::from_millis(self.composer_timeout_ms)
    }

    /// Longest a turn of `max_hops` can run when every call hits its deadline
    pub fn turn_budget(&self, max_hops: usize) -> Duration {
        let per_hop = self
            .store_timeout_ms
            .saturating_add(self.summarizer_timeout_ms)
            .saturating_add(self.decider_timeout_ms);
        Duration::from_millis(
            per_hop
                .saturating_mul(max_hops as u64)
                .saturating_add(self.composer_timeout_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.graph_store.database, "neo4j");
        assert!(!config.llm.enabled);
    }

    #[test]
    fn test_reasoning_defaults() {
        let reasoning = ReasoningConfig::default();
        assert_eq!(reasoning.explore_limit, 15);
        assert_eq!(reasoning.max_discovered_entities, 10);
        assert_eq!(reasoning.decider_context_chars, 800);
        assert_eq!(reasoning.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.reasoning.turn_budget(3), Duration::from_secs(95));
        assert!(config.request_timeout() >= config.reasoning.turn_budget(Pattern::longest_plan()));
        assert!(config.graph_store.timeout_ms < config.reasoning.store_timeout_ms);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_request_timeout_must_cover_turn() {
        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 1;
        config.reasoning = ReasoningConfig {
            store_timeout_ms: 100,
            summarizer_timeout_ms: 100,
            decider_timeout_ms: 800,
            composer_timeout_ms: 100,
            ..ReasoningConfig::default()
        };
        config.graph_store.timeout_ms = 50;

        // Each deadline fits in a second, three hops of them do not
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));

        config.server.request_timeout_secs = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_http_timeout_below_reasoning_deadline() {
        let mut config = AppConfig::default();
        config.graph_store.timeout_ms = config.reasoning.store_timeout_ms;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("graph_store.timeout_ms"));
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = Config::builder()
            .set_override("graph_store.url", "http://neo4j:7474")
            .unwrap()
            .set_override("reasoning.explore_limit", 7)
            .unwrap()
            .build()
            .unwrap();
        let app: AppConfig = config.try_deserialize().unwrap();

        assert_eq!(app.graph_store.url, "http://neo4j:7474");
        assert_eq!(app.graph_store.timeout_ms, 2_000);
        assert_eq!(app.reasoning.explore_limit, 7);
        assert_eq!(app.server.port, 8080);
    }
}
