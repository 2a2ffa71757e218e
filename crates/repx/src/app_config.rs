//! 🔧 App Configuration - the sacred TOML-to-struct pipeline, now with an API key in it.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Next to the binary.
//! In ~/.config. Nothing." - every developer at 3am 🦆
//!
//! 🧠 Knowledge graph:
//! - [`AppConfig`] is what figment extracts: `[api]`, `[output]`, `[log]`, `[runtime]`.
//!   Every section and every field has a default, so an empty world still parses.
//! - Layers, lowest to highest: serde defaults → `REPX_*` env (`__` nests, so
//!   `REPX_API__HOST` is `api.host`) → the TOML file.
//! - [`RunOverrides`] are the CLI knobs. [`AppConfig::resolve`] folds them in, validates,
//!   and produces the immutable [`RunConfig`] that every worker reads through an `Arc`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::error::RepError;
use crate::sink::{BackpressurePolicy, OutputFormat};

/// 📦 Everything the config file and the environment can say.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 📡 Where the DNS API lives and how we say hello to it.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

fn default_api_host() -> String {
    "https://repproject.world".to_string()
}

fn default_api_key() -> String {
    "@repproject".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            api_key: default_api_key(),
        }
    }
}

/// 💾 Output shape and location. Format stays a string until `resolve` so a typo gets a
/// proper configuration error instead of a serde one.
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_format")]
    pub format: String,
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_format() -> String {
    "ndjson".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            dir: default_output_dir(),
        }
    }
}

/// 📜 Log level used when `RUST_LOG` is not set.
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// ⚙️ Runtime knobs. The CLI can override most of these per run.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// 🧢 per-target record cap for generic scans, 0 = unlimited
    #[serde(default = "default_max_records_per_target")]
    pub max_records_per_target: usize,
    #[serde(default)]
    pub output_enabled: bool,
    #[serde(default = "default_sink_queue_capacity")]
    pub sink_queue_capacity: usize,
    #[serde(default)]
    pub backpressure: BackpressurePolicy,
}

fn default_page_size() -> usize {
    100
}

fn default_threads() -> usize {
    1
}

fn default_max_records_per_target() -> usize {
    100
}

fn default_sink_queue_capacity() -> usize {
    100
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            threads: default_threads(),
            max_records_per_target: default_max_records_per_target(),
            output_enabled: false,
            sink_queue_capacity: default_sink_queue_capacity(),
            backpressure: BackpressurePolicy::default(),
        }
    }
}

/// 🎛️ Per-run overrides from the command line. `None` means "whatever the config says".
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub page_size: Option<usize>,
    pub threads: Option<usize>,
    pub max_records_per_target: Option<usize>,
    /// 🚩 a flag, so it can only switch output on
    pub output_enabled: bool,
}

/// 🔒 The resolved, validated run configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub page_size: usize,
    pub threads: usize,
    pub max_records_per_target: usize,
    pub output_enabled: bool,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub api_host: String,
    pub api_key: String,
    pub sink_queue_capacity: usize,
    pub backpressure: BackpressurePolicy,
}

impl RunConfig {
    /// 📁 `<dir>/<stem>.<format>`, e.g. `output/stream.ndjson`.
    pub fn output_path(&self, stem: &str) -> PathBuf {
        self.output_dir
            .join(format!("{stem}.{}", self.output_format.extension()))
    }
}

impl AppConfig {
    /// 🧮 Fold the CLI overrides in and validate. Fails with `RepError::Configuration`.
    pub fn resolve(&self, overrides: &RunOverrides) -> Result<RunConfig, RepError> {
        let page_size = overrides.page_size.unwrap_or(self.runtime.page_size);
        if page_size == 0 {
            return Err(RepError::config("page size must be at least 1"));
        }
        let output_format: OutputFormat = self.output.format.parse()?;
        reqwest::Url::parse(&self.api.host).map_err(|err| {
            RepError::config(format!("API host '{}' is not a valid URL: {err}", self.api.host))
        })?;

        Ok(RunConfig {
            page_size,
            threads: overrides.threads.unwrap_or(self.runtime.threads).max(1),
            max_records_per_target: overrides
                .max_records_per_target
                .unwrap_or(self.runtime.max_records_per_target),
            output_enabled: overrides.output_enabled || self.runtime.output_enabled,
            output_dir: self.output.dir.clone(),
            output_format,
            api_host: self.api.host.clone(),
            api_key: self.api.api_key.clone(),
            sink_queue_capacity: self.runtime.sink_queue_capacity.max(1),
            backpressure: self.runtime.backpressure,
        })
    }
}

/// 🔍 Where does the config file actually live?
///
/// 1. the path as given (relative to the working directory)
/// 2. next to the running executable
/// 3. `<user config dir>/repclient/<file name>`
///
/// `None` when none of those exist.
pub fn find_config_file(requested: &Path) -> Option<PathBuf> {
    if requested.is_file() {
        return Some(requested.to_path_buf());
    }
    let file_name = requested.file_name()?;

    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(file_name)));
    let user_config = directories::ProjectDirs::from("", "", "repclient")
        .map(|dirs| dirs.config_dir().join(file_name));

    [beside_exe, user_config]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.is_file())
}

/// 🚀 Load the config: defaults, then `REPX_*` env, then the TOML file if one is found.
///
/// A missing file is not an error. It just means defaults + env, and a log line saying so.
/// An unparseable file or a malformed env var is an error, with the file named in it.
pub fn load_config(requested: &Path) -> anyhow::Result<AppConfig> {
    let config = Figment::new().merge(Env::prefixed("REPX_").split("__"));

    let (config, context_msg) = match find_config_file(requested) {
        Some(path) => {
            info!("🔧 Loading configuration from {}", path.display());
            let msg = format!(
                "💀 Failed to parse configuration from '{}' and environment variables (REPX_*). \
                 The file exists. Its contents are a matter of opinion.",
                path.display()
            );
            (config.merge(Toml::file(&path)), msg)
        }
        None => {
            info!(
                "🔧 No config file found for '{}', running on defaults + environment",
                requested.display()
            );
            let msg = "💀 Failed to parse configuration from environment variables (REPX_*). \
                       No file was involved. This one's all on the environment."
                .to_string();
            (config, msg)
        }
    };

    config.extract().context(context_msg)
}
