// Configuration module for the idstate verifier node
//
// This module handles loading and managing the verifier node configuration

use crate::error::{Result, VerifierNodeError};
use idstate::auth::message::ZeroKnowledgeProofRequest;
use idstate::auth::query::{Operator, Query};
use idstate::auth::resolver::RetryPolicy;
use idstate::claim::schema::{KYC_AGE_CREDENTIAL, KYC_V3_CONTEXT};
use idstate::zk::CircuitId;
use idstate::{FieldElement, VerifierConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Verifier node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Verification policy
    #[serde(default)]
    pub verifier: VerifierSettings,
    /// State registry access
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// What the sign-in request asks for
    #[serde(default)]
    pub request: RequestConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// API port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL used in callback links
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Audience named in authorization requests
    #[serde(default = "default_audience")]
    pub audience: String,
}

/// Verification policy, in seconds unless noted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierSettings {
    #[serde(default = "default_state_transition_delay")]
    pub accepted_state_transition_delay_secs: u64,
    #[serde(default = "default_proof_generation_delay")]
    pub accepted_proof_generation_delay_secs: u64,
    #[serde(default = "default_callback_deadline")]
    pub callback_deadline_secs: u64,
    #[serde(default = "default_session_retention")]
    pub session_retention_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub expiry_sweep_interval_secs: u64,
    #[serde(default = "default_resolver_attempts")]
    pub resolver_attempts: u32,
    #[serde(default = "default_resolver_backoff")]
    pub resolver_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Process-local registry; only unpublished genesis states resolve
    Memory,
    /// State registry REST API
    Http,
}

/// State registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_kind")]
    pub kind: ResolverKind,
    /// Base URL of the registry API (http only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-lookup timeout in milliseconds
    #[serde(default = "default_resolver_timeout")]
    pub timeout_ms: u64,
}

/// Sign-in request contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_reason")]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_scope")]
    pub scope: Vec<ZeroKnowledgeProofRequest>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_audience() -> String {
    "idstate-verifier".to_string()
}

fn default_state_transition_delay() -> u64 {
    5 * 60
}

fn default_proof_generation_delay() -> u64 {
    60 * 60
}

fn default_callback_deadline() -> u64 {
    30
}

fn default_session_retention() -> u64 {
    60 * 60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_resolver_attempts() -> u32 {
    3
}

fn default_resolver_backoff() -> u64 {
    200
}

fn default_resolver_kind() -> ResolverKind {
    ResolverKind::Memory
}

fn default_resolver_timeout() -> u64 {
    5_000
}

fn default_reason() -> String {
    "test flow".to_string()
}

/// Ask for proof of a birthday before 2000-01-01 from a KYC age credential.
fn default_scope() -> Vec<ZeroKnowledgeProofRequest> {
    Query::new(
        KYC_V3_CONTEXT,
        KYC_AGE_CREDENTIAL,
        "birthday",
        Operator::Lt,
        vec![FieldElement::from_u64(20000101)],
    )
    .map(|query| {
        vec![ZeroKnowledgeProofRequest {
            id: 1,
            circuit_id: CircuitId::AtomicQueryMtpV2,
            query,
        }]
    })
    .unwrap_or_default()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            public_url: default_public_url(),
            audience: default_audience(),
        }
    }
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            accepted_state_transition_delay_secs: default_state_transition_delay(),
            accepted_proof_generation_delay_secs: default_proof_generation_delay(),
            callback_deadline_secs: default_callback_deadline(),
            session_retention_secs: default_session_retention(),
            expiry_sweep_interval_secs: default_sweep_interval(),
            resolver_attempts: default_resolver_attempts(),
            resolver_backoff_ms: default_resolver_backoff(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            kind: default_resolver_kind(),
            base_url: None,
            timeout_ms: default_resolver_timeout(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            reason: default_reason(),
            message: String::new(),
            scope: default_scope(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl VerifierSettings {
    /// Core verifier policy; the resolver timeout comes from `[resolver]`.
    pub fn to_verifier_config(&self, resolver: &ResolverConfig) -> VerifierConfig {
        VerifierConfig {
            accepted_state_transition_delay: Duration::from_secs(
                self.accepted_state_transition_delay_secs,
            ),
            accepted_proof_generation_delay: Duration::from_secs(
                self.accepted_proof_generation_delay_secs,
            ),
            callback_deadline: Duration::from_secs(self.callback_deadline_secs),
            session_retention: Duration::from_secs(self.session_retention_secs),
            resolver_retry: RetryPolicy {
                max_attempts: self.resolver_attempts,
                initial_backoff: Duration::from_millis(self.resolver_backoff_ms),
                attempt_timeout: Duration::from_millis(resolver.timeout_ms),
            },
        }
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .map_err(|e| VerifierNodeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_str)
            .map_err(|e| VerifierNodeError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_toml()?)
            .map_err(|e| VerifierNodeError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VerifierNodeError::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolver.kind == ResolverKind::Http && self.resolver.base_url.is_none() {
            return Err(VerifierNodeError::Config(
                "resolver.base_url is required for the http resolver".to_string(),
            ));
        }
        if self.request.scope.is_empty() {
            return Err(VerifierNodeError::Config(
                "request.scope must name at least one proof".to_string(),
            ));
        }
        Ok(())
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        self.verifier.to_verifier_config(&self.resolver)
    }
}
