//! 📊 summary.rs - "So... how did it go?" - every operator, after every run, forever.
//!
//! 🚀 Counts what happened to each target and what happened to each record, then lays it
//! out in a table so comfy it has lumbar support.
//!
//! 🦆 The duck reviewed the numbers. The duck has no notes.

use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 records" → "1,000,000 records" - you're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the long hauls.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📋 The end-of-run tally.
///
/// `processed` counts every target that was picked up. `skipped` and `failed` are subsets
/// of it: unclassifiable targets and targets whose fetch or save went wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: String,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub records: u64,
    /// 🗑️ items the backpressure policy threw away
    pub dropped: u64,
    /// 💾 save calls that errored (records lost to the disk, not the network)
    pub write_failures: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            ..Default::default()
        }
    }

    /// 🧮 Fold another tally in, e.g. one worker's numbers into the pool's.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.records += other.records;
        self.dropped += other.dropped;
        self.write_failures += other.write_failures;
    }

    /// 💀 Something was attempted and nothing came through: every target failed or was skipped.
    pub fn is_total_failure(&self) -> bool {
        self.processed > 0 && self.failed + self.skipped >= self.processed
    }

    /// 🍽️ Two columns, right-aligned numbers, no borders.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let rows: [(&str, String); 7] = [
            ("targets processed", format_number(self.processed)),
            ("skipped (unclassifiable)", format_number(self.skipped)),
            ("failed", format_number(self.failed)),
            ("records fetched", format_number(self.records)),
            ("dropped (backpressure)", format_number(self.dropped)),
            ("write failures", format_number(self.write_failures)),
            ("elapsed", format_duration(self.elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        format!("🏁 {} run finished\n{table}", self.mode)
    }
}
