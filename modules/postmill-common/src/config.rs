use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::PostmillError;

/// Which chat-completion API backs the generation and judging capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    /// Any OpenAI-compatible endpoint (OpenAI itself, OpenRouter, gateways).
    OpenAi,
}

impl FromStr for Provider {
    type Err = PostmillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" | "openrouter" => Ok(Provider::OpenAi),
            other => Err(PostmillError::Config(format!(
                "POSTMILL_PROVIDER must be 'anthropic' or 'openai', got '{other}'"
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // AI providers
    pub provider: Provider,
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub generator_model: String,
    pub judge_model: String,

    // Fan-out
    pub num_workers: usize,
    pub variants_min: u32,
    pub variants_max: u32,
    pub worker_timeout: Duration,

    // Paths
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables. Malformed numbers and
    /// inconsistent ranges are reported as `PostmillError::Config`.
    pub fn from_env() -> Result<Self, PostmillError> {
        let provider: Provider = env::var("POSTMILL_PROVIDER")
            .unwrap_or_else(|_| "anthropic".to_string())
            .parse()?;

        let default_model = match provider {
            Provider::Anthropic => "claude-opus-4-5-20251101",
            Provider::OpenAi => "gpt-4o",
        };
        let generator_model = env_or("POSTMILL_GENERATOR_MODEL", default_model);
        let judge_model = env::var("POSTMILL_JUDGE_MODEL").unwrap_or_else(|_| generator_model.clone());

        let config = Self {
            provider,
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: env::var("OPENAI_BASE_URL").ok().filter(|s| !s.is_empty()),
            generator_model,
            judge_model,
            num_workers: parsed_env("POSTMILL_WORKERS", 7)?,
            variants_min: parsed_env("POSTMILL_VARIANTS_MIN", 1)?,
            variants_max: parsed_env("POSTMILL_VARIANTS_MAX", 1)?,
            worker_timeout: Duration::from_secs(parsed_env("POSTMILL_WORKER_TIMEOUT_SECS", 180)?),
            config_dir: PathBuf::from(env_or("POSTMILL_CONFIG_DIR", "config")),
            data_dir: PathBuf::from(env_or("POSTMILL_DATA_DIR", "data")),
            output_dir: PathBuf::from(env_or("POSTMILL_OUTPUT_DIR", "output/runs")),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PostmillError> {
        if self.num_workers == 0 {
            return Err(PostmillError::Config("POSTMILL_WORKERS must be at least 1".into()));
        }
        if self.variants_min == 0 || self.variants_min > self.variants_max {
            return Err(PostmillError::Config(format!(
                "variant range {}..={} is empty or starts at zero",
                self.variants_min, self.variants_max
            )));
        }
        Ok(())
    }

    /// API key for the configured provider, or a config error if it is unset.
    pub fn api_key(&self) -> Result<&str, PostmillError> {
        let (key, var) = match self.provider {
            Provider::Anthropic => (&self.anthropic_api_key, "ANTHROPIC_API_KEY"),
            Provider::OpenAi => (&self.openai_api_key, "OPENAI_API_KEY"),
        };
        if key.is_empty() {
            return Err(PostmillError::Config(format!("{var} environment variable is required")));
        }
        Ok(key)
    }

    pub fn creativity_file(&self) -> PathBuf {
        self.config_dir.join("creativity.yaml")
    }

    pub fn personas_file(&self) -> PathBuf {
        self.config_dir.join("personas.yaml")
    }

    pub fn banned_words_file(&self) -> PathBuf {
        self.config_dir.join("banned_words.txt")
    }

    pub fn examples_dir(&self) -> PathBuf {
        self.data_dir.join("examples")
    }

    /// Log the effective configuration with secrets reduced to presence flags.
    pub fn log_redacted(&self) {
        info!(
            provider = ?self.provider,
            anthropic_key_set = !self.anthropic_api_key.is_empty(),
            openai_key_set = !self.openai_api_key.is_empty(),
            openai_base_url = self.openai_base_url.as_deref().unwrap_or("default"),
            generator_model = self.generator_model.as_str(),
            judge_model = self.judge_model.as_str(),
            num_workers = self.num_workers,
            variants_min = self.variants_min,
            variants_max = self.variants_max,
            worker_timeout_secs = self.worker_timeout.as_secs(),
            config_dir = %self.config_dir.display(),
            output_dir = %self.output_dir.display(),
            "Loaded config"
        );
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T, PostmillError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PostmillError::Config(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_aliases() {
        assert_eq!("Anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("openrouter".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("gemini".parse::<Provider>().is_err());
    }

    fn sample() -> Config {
        Config {
            provider: Provider::Anthropic,
            anthropic_api_key: String::new(),
            openai_api_key: "sk-test".into(),
            openai_base_url: None,
            generator_model: "m".into(),
            judge_model: "m".into(),
            num_workers: 3,
            variants_min: 1,
            variants_max: 2,
            worker_timeout: Duration::from_secs(5),
            config_dir: PathBuf::from("config"),
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("out"),
        }
    }

    #[test]
    fn missing_key_for_selected_provider_is_config_error() {
        let config = sample();
        assert!(matches!(config.api_key(), Err(PostmillError::Config(_))));

        let config = Config { provider: Provider::OpenAi, ..sample() };
        assert_eq!(config.api_key().unwrap(), "sk-test");
    }

    #[test]
    fn inverted_variant_range_is_rejected() {
        let config = Config { variants_min: 3, variants_max: 1, ..sample() };
        assert!(config.validate().is_err());

        let config = Config { num_workers: 0, ..sample() };
        assert!(config.validate().is_err());

        assert!(sample().validate().is_ok());
    }

    #[test]
    fn derived_paths_live_under_configured_dirs() {
        let config = sample();
        assert_eq!(config.creativity_file(), PathBuf::from("config/creativity.yaml"));
        assert_eq!(config.personas_file(), PathBuf::from("config/personas.yaml"));
        assert_eq!(config.examples_dir(), PathBuf::from("data/examples"));
    }
}
