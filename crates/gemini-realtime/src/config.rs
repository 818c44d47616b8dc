//! Session configuration.
//!
//! A [`SessionConfig`] is built once, either in code or from the environment,
//! and handed to a [`crate::LiveConnection`], which keeps it behind an `Arc`
//! for the rest of its life.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::error::{RealtimeError, RealtimeResult};

/// Bidirectional content endpoint of the live API.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";
pub const DEFAULT_VOICE: &str = "Puck";
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Sample rate of the PCM16 audio the service accepts as input.
pub const GEMINI_INPUT_SAMPLE_RATE: u32 = 16000;

/// Fixed pause between receive attempts used by the default retry policy.
pub const DEFAULT_RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

/// How realtime media chunks are laid out inside `realtimeInput`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaChunkLayout {
    /// `{"realtimeInput": {"mediaChunks": [{mimeType, data}]}}`
    #[default]
    MediaChunks,
    /// `{"realtimeInput": {"audio": {mimeType, data}}}` (or `video`).
    Typed,
}

/// Generation parameters sent with the setup message.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    pub voice_name: String,
    pub language_code: String,
    pub temperature: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            response_modalities: vec![ResponseModality::Audio],
            voice_name: DEFAULT_VOICE.to_string(),
            language_code: DEFAULT_LANGUAGE.to_string(),
            temperature: None,
        }
    }
}

/// Policy applied by the receive loop when reading from the socket fails.
///
/// The default reproduces a fixed 250ms pause with no retry limit. Setting
/// `max_attempts` bounds the loop: once reached, the connection is closed
/// and reported as lost.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveRetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor applied per consecutive failure. `1.0` keeps the delay fixed.
    pub backoff_multiplier: f64,
    /// Retries allowed per run of consecutive failures. `0` means unlimited.
    pub max_attempts: u32,
}

impl Default for ReceiveRetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_RECEIVE_RETRY_DELAY,
            max_delay: DEFAULT_RECEIVE_RETRY_DELAY,
            backoff_multiplier: 1.0,
            max_attempts: 0,
        }
    }
}

impl ReceiveRetryPolicy {
    /// Exponential backoff bounded by `max_delay`.
    pub fn with_backoff(
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            backoff_multiplier,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_nanos() as f64;
        let delay = base * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = delay.min(self.max_delay.as_nanos() as f64).max(0.0);
        Duration::from_nanos(capped.round() as u64)
    }

    /// Whether another retry is allowed once `attempt` retries have been made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

/// Everything needed to open and run one live session.
#[derive(Debug)]
pub struct SessionConfig {
    /// Credential passed as the `key` query parameter.
    pub api_key: SecretString,
    pub endpoint: String,
    pub model: String,
    pub generation: GenerationConfig,
    pub system_instruction: String,
    pub input_sample_rate: u32,
    pub media_layout: MediaChunkLayout,
    /// Decode text frames like binary ones instead of discarding them.
    pub accept_text_frames: bool,
    pub receive_retry: ReceiveRetryPolicy,
    /// How long `disconnect()` waits for the close to be observed.
    pub close_timeout: Duration,
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            endpoint: GEMINI_LIVE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            generation: GenerationConfig::default(),
            system_instruction: String::new(),
            input_sample_rate: GEMINI_INPUT_SAMPLE_RATE,
            media_layout: MediaChunkLayout::default(),
            accept_text_frames: false,
            receive_retry: ReceiveRetryPolicy::default(),
            close_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_receive_retry(mut self, policy: ReceiveRetryPolicy) -> Self {
        self.receive_retry = policy;
        self
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let mut config = Self::new(api_key);

        if let Ok(endpoint) = std::env::var("GEMINI_LIVE_ENDPOINT") {
            Url::parse(&endpoint).map_err(|e| {
                ConfigError::InvalidValue("GEMINI_LIVE_ENDPOINT".to_string(), e.to_string())
            })?;
            config.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Ok(voice) = std::env::var("GEMINI_VOICE") {
            config.generation.voice_name = voice;
        }
        if let Ok(language) = std::env::var("GEMINI_LANGUAGE") {
            config.generation.language_code = language;
        }
        if let Ok(instruction) = std::env::var("GEMINI_SYSTEM_INSTRUCTION") {
            config.system_instruction = instruction;
        }
        config.generation.temperature = parse_var::<f32>("GEMINI_TEMPERATURE")?;
        if let Some(rate) = parse_var::<u32>("GEMINI_INPUT_SAMPLE_RATE")? {
            config.input_sample_rate = rate;
        }
        if let Some(ms) = parse_var::<u64>("GEMINI_RECEIVE_RETRY_MS")? {
            if ms == 0 {
                return Err(ConfigError::InvalidValue(
                    "GEMINI_RECEIVE_RETRY_MS".to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
            let delay = Duration::from_millis(ms);
            config.receive_retry.initial_delay = delay;
            config.receive_retry.max_delay = delay;
        }
        if let Some(max) = parse_var::<u32>("GEMINI_RECEIVE_MAX_RETRIES")? {
            config.receive_retry.max_attempts = max;
        }

        Ok(config)
    }

    /// Endpoint URL with the credential attached as a query parameter.
    pub fn request_url(&self) -> RealtimeResult<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("endpoint '{}': {e}", self.endpoint))
        })?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }

    pub(crate) fn validate(&self) -> RealtimeResult<()> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "API key is required".to_string(),
            ));
        }
        if self.model.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "model is required".to_string(),
            ));
        }
        let retry = &self.receive_retry;
        if retry.initial_delay.is_zero() || retry.max_delay.is_zero() {
            return Err(RealtimeError::InvalidConfiguration(
                "receive retry delay must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn audio_mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.input_sample_rate)
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("GEMINI_LIVE_ENDPOINT");
            env::remove_var("GEMINI_MODEL");
            env::remove_var("GEMINI_VOICE");
            env::remove_var("GEMINI_LANGUAGE");
            env::remove_var("GEMINI_SYSTEM_INSTRUCTION");
            env::remove_var("GEMINI_TEMPERATURE");
            env::remove_var("GEMINI_INPUT_SAMPLE_RATE");
            env::remove_var("GEMINI_RECEIVE_RETRY_MS");
            env::remove_var("GEMINI_RECEIVE_MAX_RETRIES");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("key");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.generation.voice_name, "Puck");
        assert_eq!(
            config.generation.response_modalities,
            vec![ResponseModality::Audio]
        );
        assert_eq!(config.generation.temperature, None);
        assert_eq!(config.input_sample_rate, 16000);
        assert_eq!(config.media_layout, MediaChunkLayout::MediaChunks);
        assert!(!config.accept_text_frames);
        assert_eq!(config.receive_retry, ReceiveRetryPolicy::default());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = SessionConfig::new("super-secret-key");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-key"));
    }

    #[test]
    fn test_request_url_carries_key() {
        let config = SessionConfig::new("abc 123&x");
        let url = config.request_url().unwrap();
        assert!(url.as_str().starts_with(GEMINI_LIVE_URL));
        let key = url
            .query_pairs()
            .find(|(k, _)| k == "key")
            .map(|(_, v)| v.into_owned());
        assert_eq!(key.as_deref(), Some("abc 123&x"));
    }

    #[test]
    fn test_request_url_rejects_bad_endpoint() {
        let config = SessionConfig::new("key").with_endpoint("not a url");
        match config.request_url() {
            Err(RealtimeError::InvalidConfiguration(msg)) => assert!(msg.contains("not a url")),
            other => panic!("Expected InvalidConfiguration, got {other:?}"),
        }
    }

    #[test]
    fn test_validate() {
        assert!(SessionConfig::new("key").validate().is_ok());
        assert!(matches!(
            SessionConfig::new("  ").validate(),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            SessionConfig::new("key").with_model("").validate(),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_retry_delay() {
        let mut config = SessionConfig::new("key");
        config.receive_retry.initial_delay = Duration::ZERO;
        match config.validate() {
            Err(RealtimeError::InvalidConfiguration(msg)) => assert!(msg.contains("retry delay")),
            other => panic!("Expected InvalidConfiguration, got {other:?}"),
        }

        let mut config = SessionConfig::new("key");
        config.receive_retry.max_delay = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_audio_mime_type() {
        let mut config = SessionConfig::new("key");
        assert_eq!(config.audio_mime_type(), "audio/pcm;rate=16000");
        config.input_sample_rate = 24000;
        assert_eq!(config.audio_mime_type(), "audio/pcm;rate=24000");
    }

    #[test]
    fn test_retry_policy_default_is_fixed_and_unbounded() {
        let policy = ReceiveRetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(50), Duration::from_millis(250));
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(u32::MAX));
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = ReceiveRetryPolicy::with_backoff(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            2.0,
            5,
        );
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        // capped
        assert_eq!(policy.delay_for(5), Duration::from_millis(1000));

        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }

        let config = SessionConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.api_key.expose_secret(), "test-gemini-key");
        assert_eq!(config.endpoint, GEMINI_LIVE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.generation, GenerationConfig::default());
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "custom-key");
            env::set_var("GEMINI_LIVE_ENDPOINT", "ws://127.0.0.1:9000/live");
            env::set_var("GEMINI_MODEL", "models/custom");
            env::set_var("GEMINI_VOICE", "Kore");
            env::set_var("GEMINI_LANGUAGE", "es-US");
            env::set_var("GEMINI_SYSTEM_INSTRUCTION", "You are a fitness trainer");
            env::set_var("GEMINI_TEMPERATURE", "0.4");
            env::set_var("GEMINI_INPUT_SAMPLE_RATE", "24000");
            env::set_var("GEMINI_RECEIVE_RETRY_MS", "100");
            env::set_var("GEMINI_RECEIVE_MAX_RETRIES", "3");
        }

        let config = SessionConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/live");
        assert_eq!(config.model, "models/custom");
        assert_eq!(config.generation.voice_name, "Kore");
        assert_eq!(config.generation.language_code, "es-US");
        assert_eq!(config.generation.temperature, Some(0.4));
        assert_eq!(config.system_instruction, "You are a fitness trainer");
        assert_eq!(config.input_sample_rate, 24000);
        assert_eq!(config.receive_retry.initial_delay, Duration::from_millis(100));
        assert_eq!(config.receive_retry.max_attempts, 3);

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();

        let err = SessionConfig::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("GEMINI_API_KEY")),
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_temperature() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "key");
            env::set_var("GEMINI_TEMPERATURE", "warm");
        }

        let err = SessionConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "GEMINI_TEMPERATURE"),
            _ => panic!("Expected InvalidValue for GEMINI_TEMPERATURE"),
        }

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_endpoint() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "key");
            env::set_var("GEMINI_LIVE_ENDPOINT", "::nope::");
        }

        let err = SessionConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "GEMINI_LIVE_ENDPOINT"),
            _ => panic!("Expected InvalidValue for GEMINI_LIVE_ENDPOINT"),
        }

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_zero_retry_delay() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "key");
            env::set_var("GEMINI_RECEIVE_RETRY_MS", "0");
        }

        let err = SessionConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "GEMINI_RECEIVE_RETRY_MS"),
            _ => panic!("Expected InvalidValue for GEMINI_RECEIVE_RETRY_MS"),
        }

        clear_env_vars();
    }
}
