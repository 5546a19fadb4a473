//! Configuration types, built from environment variables.

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::models::{AgentType, Channel};

/// Per-agent delivery settings.
///
/// External, mutable configuration that the delivery policy engine reads
/// but does not own.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Send generated replies without human approval.
    pub auto_send: bool,
    /// Simulated typing delay bounds in milliseconds, applied before
    /// auto-sends. `None` disables the delay.
    pub typing_delay_ms: Option<(u64, u64)>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            auto_send: false,
            typing_delay_ms: None,
        }
    }
}

/// Responder tuning.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// How many chunks to retrieve per query.
    pub top_k: usize,
    /// How many history messages to interpolate into the prompt.
    pub history_limit: usize,
    /// Output token cap for SMS replies (short-form channel).
    pub sms_max_tokens: u32,
    /// Output token cap for email replies (roughly 2.5x the SMS cap).
    pub email_max_tokens: u32,
    pub temperature: f32,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            history_limit: 6,
            sms_max_tokens: 200,
            email_max_tokens: 500,
            temperature: 0.4,
        }
    }
}

/// Drip-scheduler settings.
#[derive(Debug, Clone)]
pub struct DripConfig {
    /// Tick cadence as a cron expression (seconds-precision, hourly default).
    pub cron_expr: String,
    /// Optional cap on send attempts per step. `None` preserves the
    /// retry-every-tick-forever behavior; operators opt into a cap.
    pub max_attempts: Option<u32>,
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            cron_expr: "0 0 * * * *".to_string(),
            max_attempts: None,
        }
    }
}

impl DripConfig {
    /// Parse the tick cadence, rejecting a malformed cron expression at
    /// startup rather than inside the tick loop.
    pub fn schedule(&self) -> Result<cron::Schedule, ConfigError> {
        use std::str::FromStr;
        cron::Schedule::from_str(&self.cron_expr).map_err(|e| ConfigError::InvalidValue {
            key: "PILOT_DRIP_CRON".into(),
            message: e.to_string(),
        })
    }
}

/// Completion/embedding service settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub completion_model: String,
    pub embedding_model: String,
    /// Request ceiling for completion/embedding calls (request-path
    /// dependencies — seconds, not minutes).
    pub timeout_secs: u64,
}

impl LlmSettings {
    /// Build from environment. `LLM_API_KEY` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("LLM_API_KEY".into()))?;

        Ok(Self {
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            api_key: SecretString::from(api_key),
            completion_model: std::env::var("LLM_COMPLETION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: std::env::var("LLM_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            timeout_secs: env_parse("LLM_TIMEOUT_SECS", 30),
        })
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Bearer token for approval/sequence/knowledge endpoints.
    pub api_token: Option<SecretString>,
    pub support: AgentSettings,
    pub sales: AgentSettings,
    /// Which persona handles each inbound channel.
    pub email_agent: AgentType,
    pub sms_agent: AgentType,
    pub responder: ResponderConfig,
    pub drip: DripConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            api_token: None,
            support: AgentSettings::default(),
            sales: AgentSettings::default(),
            email_agent: AgentType::Support,
            sms_agent: AgentType::Support,
            responder: ResponderConfig::default(),
            drip: DripConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build config from environment variables, with defaults for everything
    /// except secrets.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PILOT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.api_token = std::env::var("PILOT_API_TOKEN").ok().map(SecretString::from);

        config.support.auto_send = env_flag("PILOT_SUPPORT_AUTO_SEND", false);
        config.sales.auto_send = env_flag("PILOT_SALES_AUTO_SEND", false);
        if env_flag("PILOT_TYPING_DELAY", false) {
            let delay = (env_parse("PILOT_TYPING_DELAY_MIN_MS", 1_500u64), env_parse("PILOT_TYPING_DELAY_MAX_MS", 6_000u64));
            config.support.typing_delay_ms = Some(delay);
            config.sales.typing_delay_ms = Some(delay);
        }

        if let Some(agent) = env_parse_opt::<AgentType>("PILOT_EMAIL_AGENT") {
            config.email_agent = agent;
        }
        if let Some(agent) = env_parse_opt::<AgentType>("PILOT_SMS_AGENT") {
            config.sms_agent = agent;
        }

        if let Ok(expr) = std::env::var("PILOT_DRIP_CRON") {
            config.drip.cron_expr = expr;
        }
        config.drip.max_attempts = std::env::var("PILOT_DRIP_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok());

        config.responder.sms_max_tokens = env_parse("PILOT_SMS_MAX_TOKENS", config.responder.sms_max_tokens);
        config.responder.email_max_tokens = env_parse("PILOT_EMAIL_MAX_TOKENS", config.responder.email_max_tokens);

        config
    }

    /// Delivery settings for a persona.
    pub fn agent_settings(&self, agent: AgentType) -> &AgentSettings {
        match agent {
            AgentType::Support => &self.support,
            AgentType::Sales => &self.sales,
        }
    }

    /// Persona that handles inbound messages on a channel.
    pub fn agent_for(&self, channel: Channel) -> AgentType {
        match channel {
            Channel::Email => self.email_agent,
            Channel::Sms => self.sms_agent,
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_parse_opt(key).unwrap_or(default)
}

fn env_parse_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
