//! 📂 TargetSource - reads a target list line by line, hands out the non-blank ones.
//!
//! 🎬 *[a text file. ten thousand lines. some are IPs. some are hostnames.
//! some are just a single space someone left in 2019.]*
//!
//! 🧠 Knowledge graph:
//! - Line-oriented UTF-8. Each line is trimmed; blank and whitespace-only lines are skipped.
//! - Lazy: one `read_line` per call, so the bounded job queue downstream is the only
//!   buffer between the file and the workers.
//! - Ends when the reader hits EOF. Any read fault (including invalid UTF-8) is returned as
//!   `RepError::TargetSource` and is fatal to the run. No retries here.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::trace;

use crate::error::RepError;

// 🧠 boxed so files, stdin, and in-memory test fixtures all fit the same struct field
type TargetReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// 📂 A lazy, single-pass sequence of trimmed, non-empty target lines.
pub struct TargetSource {
    reader: TargetReader,
    label: String,
    line: String,
    lines_read: usize,
}

impl std::fmt::Debug for TargetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetSource")
            .field("label", &self.label)
            .field("lines_read", &self.lines_read)
            .finish()
    }
}

impl TargetSource {
    /// 🚀 Open a target list file. A missing or unreadable file is fatal, and says so.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RepError> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|source| RepError::TargetSource {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file), path.display().to_string()))
    }

    /// 🔧 Wrap any buffered async reader. `label` shows up in errors and logs.
    pub fn from_reader(reader: impl AsyncBufRead + Send + Unpin + 'static, label: impl Into<String>) -> Self {
        Self {
            reader: Box::new(reader),
            label: label.into(),
            line: String::with_capacity(256),
            lines_read: 0,
        }
    }

    /// 📄 Next non-blank target, `Ok(None)` at EOF.
    pub async fn next_target(&mut self) -> Result<Option<String>, RepError> {
        loop {
            self.line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut self.line)
                .await
                .map_err(|source| RepError::TargetSource {
                    path: self.label.clone(),
                    source,
                })?;
            if bytes_read == 0 {
                trace!("📖 {} exhausted after {} lines", self.label, self.lines_read);
                return Ok(None);
            }
            self.lines_read += 1;
            let trimmed = self.line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}
