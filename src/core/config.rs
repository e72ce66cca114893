use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::services::llm::LlmConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    #[serde(default = "default_max_feedback_rounds")]
    pub max_feedback_rounds: u32,

    #[serde(default)]
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            max_feedback_rounds: default_max_feedback_rounds(),
            llm: LlmConfig::default(),
        }
    }
}

fn default_working_dir() -> String {
    "./novels".to_string()
}
fn default_max_feedback_rounds() -> u32 {
    10
}

impl Config {
    /// Reads `config.yml` when present, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(Path::new("config.yml"))?;
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup. Unparsable numbers are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NOVEL_WORKING_DIR") {
            self.working_dir = v;
        }
        if let Some(v) = lookup("NOVEL_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = lookup("NOVEL_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = lookup("QWEN_MODEL_NAME") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("QWEN_API_KEY") {
            self.llm.api_key = v;
        }
        override_parsed(&lookup, "QWEN_TEMPERATURE", &mut self.llm.temperature);
        override_parsed(&lookup, "QWEN_MAX_TOKENS", &mut self.llm.max_tokens);
        override_parsed(
            &lookup,
            "NOVEL_LLM_TIMEOUT_SECONDS",
            &mut self.llm.timeout_seconds,
        );
        override_parsed(
            &lookup,
            "NOVEL_MAX_FEEDBACK_ROUNDS",
            &mut self.max_feedback_rounds,
        );
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.working_dir)
            .with_context(|| format!("Failed to create {}", self.working_dir))?;
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => log::warn!("Ignoring invalid value for {}: {:?}", key, raw),
        }
    }
}
