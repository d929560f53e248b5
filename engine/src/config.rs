use anyhow::{Context, Result};
use common::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_model")]
    pub model: String,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    /// Outbound proxy for backend requests
    pub proxy: Option<String>,
}

fn default_model() -> String { common::DEFAULT_MODEL.to_string() }

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: None,
            api_key: None,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String { common::DEFAULT_EXPLANATION_LANGUAGE.to_string() }

impl Default for CompilerConfig {
    fn default() -> Self {
        Self { language: default_language() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_targets_user")]
    pub targets_user: bool,
    #[serde(default = "default_tab_file")]
    pub tab_file: PathBuf,
    #[serde(default = "default_comment")]
    pub comment: String,
}

fn default_targets_user() -> bool { true }
fn default_tab_file() -> PathBuf { PathBuf::from(common::DEFAULT_TAB_FILE) }
fn default_comment() -> String { common::DEFAULT_COMMENT.to_string() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            targets_user: default_targets_user(),
            tab_file: default_tab_file(),
            comment: default_comment(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "warn".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
        }
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(common::USER_CONFIG_PATH))
    }

    /// `explicit` if given (it must exist), else the user config file if
    /// present, else defaults. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();
        match explicit {
            Some(path) => config.merge(Self::from_file(path)?),
            None => {
                if let Some(path) = Self::user_config_path().filter(|p| p.exists()) {
                    log::debug!("Loading user config from {:?}", path);
                    config.merge(Self::from_file(&path)?);
                }
            }
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Merge with another config, preferring values from other
    pub fn merge(&mut self, other: Config) {
        self.provider.model = other.provider.model;
        if other.provider.api_base.is_some() {
            self.provider.api_base = other.provider.api_base;
        }
        if other.provider.api_key.is_some() {
            self.provider.api_key = other.provider.api_key;
        }
        if other.provider.proxy.is_some() {
            self.provider.proxy = other.provider.proxy;
        }

        self.compiler.language = other.compiler.language;

        self.scheduler.targets_user = other.scheduler.targets_user;
        self.scheduler.tab_file = other.scheduler.tab_file;
        self.scheduler.comment = other.scheduler.comment;

        self.logging.level = other.logging.level;
        if other.logging.output.is_some() {
            self.logging.output = other.logging.output;
        }
    }

    /// Apply `AICRON_*` overrides; `lookup` is usually `std::env::var`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(model) = lookup("AICRON_MODEL") {
            self.provider.model = model;
        }
        if let Some(base) = lookup("AICRON_API_BASE") {
            self.provider.api_base = Some(base);
        }
        if let Some(key) = lookup("AICRON_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(proxy) = lookup("AICRON_PROXY") {
            self.provider.proxy = Some(proxy);
        }
        if let Some(log_file) = lookup("AICRON_LOG") {
            self.logging.output = Some(PathBuf::from(log_file));
        }
    }

    /// Defaults that per-invocation overrides are merged over.
    pub fn provider_defaults(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new(&self.provider.model);
        if let Some(base) = &self.provider.api_base {
            config = config.with_api_base(base);
        }
        if let Some(key) = &self.provider.api_key {
            config = config.with_api_key(key);
        }
        config
    }
}
