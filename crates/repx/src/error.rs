//! 💀 The error taxonomy - every way a lookup can go sideways, sorted into labeled bins.
//!
//! 🎬 *[a worker stares at a 502. the 502 stares back. neither blinks.]*
//!
//! Library code returns `RepError` so callers can tell a dead network from a grumpy
//! upstream from a JSON body that forgot its own shape. The orchestration layer wraps
//! these in `anyhow` context chains on the way out, same as the rest of the crate.
//!
//! 🧠 Knowledge graph:
//! - `Transport` / `UpstreamStatus` / `Decode` / `CursorStalled`: per-target fetch failures.
//!   Isolated to the target. Logged. The worker moves on.
//! - `UnclassifiableTarget`: the detector shrugged. Skip, warn, continue.
//! - `OutputWrite` / `CsvShape`: the disk or the data said no. Logged, never fatal to siblings.
//! - `Configuration` / `TargetSource`: fatal, before or instead of any work. 🦆

use thiserror::Error;

/// 🏷️ Every failure the pipeline knows how to name.
#[derive(Debug, Error)]
pub enum RepError {
    /// 📡 connection refused, DNS said nope, timeout ran out of patience
    #[error("💀 transport failure talking to the DNS API: {0}")]
    Transport(#[source] reqwest::Error),

    /// 🚫 the server answered, just not with a 200
    #[error("💀 upstream answered with status {code}: {body}")]
    UpstreamStatus { code: u16, body: String },

    /// 🧩 the body arrived but it is not the envelope we were promised
    #[error("💀 could not decode the response envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// 🔁 has_more=true but the cursor is empty or already spent
    #[error("💀 pagination cursor stalled for {filter}: server said has_more but handed back cursor '{token}'")]
    CursorStalled { filter: String, token: String },

    /// 🤷 no IP, no NS, no CNAME, no TXT, no MX
    #[error("could not detect a query kind for '{0}'")]
    UnclassifiableTarget(String),

    /// 💾 serialization or filesystem fault while saving output
    #[error("💀 failed to write output to '{path}': {reason}")]
    OutputWrite { path: String, reason: String },

    /// 📐 csv wants a table, got something shaped like modern art
    #[error("💀 csv output needs uniform objects, item {index} is not one")]
    CsvShape { index: usize },

    /// 🔧 the run was set up in a way that cannot work
    #[error("💀 configuration error: {0}")]
    Configuration(String),

    /// 📂 the target list could not be read
    #[error("💀 failed to read targets from '{path}': {source}")]
    TargetSource {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl RepError {
    /// 🔧 shorthand for the fatal-at-startup flavor
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 💾 shorthand for wrapping any displayable write failure with its path
    pub fn output(path: impl AsRef<std::path::Path>, reason: impl std::fmt::Display) -> Self {
        Self::OutputWrite {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}
