use glimpse_core::clip::{ModelFiles, DEFAULT_LOGIT_SCALE};
use glimpse_core::presence::{DOMINANCE_MARGIN, MIN_HUMAN_SCORE};
use glimpse_core::{PromptError, PromptSet, Thresholds};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Unparseable { key: &'static str, value: String },
    #[error("{key} must be {expected}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: f64,
        expected: &'static str,
    },
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address (default: 0.0.0.0).
    pub host: String,
    /// Listen port (default: 5000).
    pub port: u16,
    /// Verbose logging.
    pub debug: bool,
    /// CLIP variant name (default: ViT-B/32).
    pub model_name: String,
    /// Directory holding one subdirectory of ONNX files per model.
    pub model_cache_dir: PathBuf,
    /// Softmax temperature applied to cosine similarities.
    pub logit_scale: f32,
    /// Absolute gate: best human prompt must score above this.
    pub min_human_score: f64,
    /// Relative gate: human mean must exceed nature mean times this.
    pub dominance_margin: f64,
    /// Optional TOML file overriding the reference prompt set.
    pub prompts_file: Option<PathBuf>,
    /// Timeout for downloading `image_url` payloads.
    pub fetch_timeout_secs: u64,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from the process environment with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unset keys take their defaults. A set key that does not parse, or a
    /// threshold that cannot gate anything, is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 5000)?,
            debug: debug_enabled(&lookup),
            model_name: lookup("MODEL_NAME").unwrap_or_else(|| "ViT-B/32".to_string()),
            model_cache_dir: lookup("MODEL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            logit_scale: parse_or(&lookup, "GLIMPSE_LOGIT_SCALE", DEFAULT_LOGIT_SCALE)?,
            min_human_score: parse_or(&lookup, "GLIMPSE_MIN_HUMAN_SCORE", MIN_HUMAN_SCORE)?,
            dominance_margin: parse_or(&lookup, "GLIMPSE_DOMINANCE_MARGIN", DOMINANCE_MARGIN)?,
            prompts_file: lookup("GLIMPSE_PROMPTS_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            fetch_timeout_secs: parse_or(&lookup, "GLIMPSE_FETCH_TIMEOUT_SECS", 30)?,
            max_body_bytes: parse_or(&lookup, "GLIMPSE_MAX_BODY_BYTES", 20 * 1024 * 1024)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let logit_scale = f64::from(self.logit_scale);
        if !(logit_scale.is_finite() && logit_scale > 0.0) {
            return Err(ConfigError::OutOfRange {
                key: "GLIMPSE_LOGIT_SCALE",
                value: logit_scale,
                expected: "a finite value > 0",
            });
        }
        if !(0.0..1.0).contains(&self.min_human_score) {
            return Err(ConfigError::OutOfRange {
                key: "GLIMPSE_MIN_HUMAN_SCORE",
                value: self.min_human_score,
                expected: "in [0, 1)",
            });
        }
        if !(self.dominance_margin.is_finite() && self.dominance_margin > 0.0) {
            return Err(ConfigError::OutOfRange {
                key: "GLIMPSE_DOMINANCE_MARGIN",
                value: self.dominance_margin,
                expected: "a finite value > 0",
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Directory of the configured model, e.g. `models/vit-b-32`.
    pub fn model_dir(&self) -> PathBuf {
        self.model_cache_dir.join(model_slug(&self.model_name))
    }

    pub fn model_files(&self) -> ModelFiles {
        ModelFiles::in_dir(&self.model_dir())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_human_score: self.min_human_score,
            dominance_margin: self.dominance_margin,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Prompt set from `GLIMPSE_PROMPTS_FILE`, or the reference set.
    pub fn prompt_set(&self) -> Result<PromptSet, PromptError> {
        match &self.prompts_file {
            Some(path) => PromptSet::load(path),
            None => Ok(PromptSet::reference()),
        }
    }
}

/// `DEBUG=true` (any case). Read on its own so logging can start first.
pub fn debug_enabled<F>(lookup: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup("DEBUG")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// "ViT-B/32" -> "vit-b-32"
fn model_slug(name: &str) -> String {
    name.trim().replace(['/', ' '], "-").to_lowercase()
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Unparseable { key, value: raw }),
        None => Ok(default),
    }
}
