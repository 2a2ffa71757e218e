//! 🦆 repx - bulk lookups against a DNS-intelligence API.
//!
//! Targets in (one, or a file of thousands), records out (ndjson, json, txt or csv).
//! The binary lives in `repx-cli`; everything with an opinion lives here.

pub mod app_config;
pub mod client;
pub mod common;
pub mod composers;
pub mod detect;
pub mod error;
pub mod sink;
pub mod summary;
pub mod supervisors;
pub mod targets;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::app_config::{AppConfig, RunOverrides};
use crate::client::RepClient;
use crate::detect::TypeDetector;
use crate::summary::RunSummary;
use crate::supervisors::{RunMode, RunRequest, Supervisor};

/// 🚀 One whole run: pick the mode, resolve the config, look everything up, report back.
///
/// Configuration problems fail here, before a single request leaves the building.
pub async fn run(app_config: &AppConfig, overrides: &RunOverrides, request: &RunRequest) -> Result<RunSummary> {
    let mode = RunMode::select(request).context("💀 Those flags do not add up to a run")?;
    let config = Arc::new(
        app_config
            .resolve(overrides)
            .context("💀 The configuration did not survive validation")?,
    );
    let client = RepClient::new(&config.api_host, config.api_key.clone(), config.page_size)
        .context("💀 Could not build the API client")?;

    Supervisor::new(config, client, TypeDetector::system())
        .run(mode)
        .await
}
