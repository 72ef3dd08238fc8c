//! Startup configuration: defaults, an optional TOML file, then environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::Deserialize;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "VERIFID_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// Bunyan-style JSON, one object per line.
    Bunyan,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "bunyan" | "json" => Ok(LogFormat::Bunyan),
            other => Err(format!("Unknown log format: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Explicit Tesseract executable; located automatically when unset.
    pub tesseract_cmd: Option<PathBuf>,
    pub max_upload_bytes: usize,
    /// Pipelines allowed to run at once; further requests wait for a slot.
    pub max_concurrent_jobs: usize,
    pub max_preprocess_pixels: u64,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            tesseract_cmd: None,
            max_upload_bytes: 20 * 1024 * 1024,
            max_concurrent_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_preprocess_pixels: verifid_ocr::DEFAULT_MAX_PIXELS,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Resolve the configuration from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::load`] with an injectable environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = match env(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(&env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(host) = env("HOST") {
            self.host = host;
        }
        if let Some(port) = env("PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value '{port}'"))?;
        }
        if let Some(cmd) = env("TESSERACT_CMD") {
            self.tesseract_cmd = Some(PathBuf::from(cmd));
        }
        if let Some(format) = env("LOG_FORMAT") {
            self.log_format = format.parse().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be greater than zero");
        }
        if self.max_concurrent_jobs == 0 {
            bail!("max_concurrent_jobs must be greater than zero");
        }
        Ok(())
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
