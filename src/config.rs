use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: Server,
    pub auth: Auth,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub sandbox: Sandbox,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    pub bind_addr: String,
    pub port: u16,
    #[serde(default = "default_base_path")]
    pub base_path: String,
}
fn default_base_path() -> String { "/mcp".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct Auth {
    pub bearer_token: String,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Limits {
    #[serde(default = "default_max_request_kb")]
    pub max_request_kb: usize,
    #[serde(default = "default_rate_per_token_s")]
    pub rate_per_token_s: u32,
    #[serde(default = "default_burst_per_token")]
    pub burst_per_token: u32,
    #[serde(default = "default_rate_global_s")]
    pub rate_global_s: u32,
    #[serde(default = "default_burst_global")]
    pub burst_global: u32,
}
fn default_max_request_kb() -> usize { 1024 }
fn default_rate_per_token_s() -> u32 { 20 }
fn default_burst_per_token() -> u32 { 40 }
fn default_rate_global_s() -> u32 { 100 }
fn default_burst_global() -> u32 { 200 }

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_request_kb: default_max_request_kb(),
            rate_per_token_s: default_rate_per_token_s(),
            burst_per_token: default_burst_per_token(),
            rate_global_s: default_rate_global_s(),
            burst_global: default_burst_global(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Sandbox {
    #[serde(default)]
    pub allowed_dirs: Vec<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    /// Directories given on the command line extend the configured ones.
    pub fn with_extra_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.sandbox.allowed_dirs.extend(dirs);
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.bearer_token.trim().is_empty() { anyhow::bail!("bearer_token must not be empty"); }
        if self.auth.allowed_origins.is_empty() { anyhow::bail!("allowed_origins must not be empty"); }
        if self.limits.max_request_kb == 0 { anyhow::bail!("max_request_kb must be > 0"); }
        if self.limits.rate_per_token_s == 0 || self.limits.burst_per_token == 0 {
            anyhow::bail!("per-token rate limits must be > 0");
        }
        if self.limits.rate_global_s == 0 || self.limits.burst_global == 0 {
            anyhow::bail!("global rate limits must be > 0");
        }
        if self.sandbox.allowed_dirs.is_empty() {
            anyhow::bail!("at least one allowed directory is required");
        }
        for dir in &self.sandbox.allowed_dirs {
            let expanded = crate::sandbox::expand_home(&dir.to_string_lossy());
            if !expanded.is_dir() {
                anyhow::bail!("allowed directory does not exist or is not a directory: {}", dir.display());
            }
        }
        Ok(())
    }
}
