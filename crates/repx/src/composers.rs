//! 🎬 *[the records are fetched. the file is open. the bytes are undecided.]*
//! *["Compose me," whispers the payload. "Make me a format."]*
//!
//! 🎼 The Composers module - turns a [`Payload`] into the exact bytes an output file wants.
//!
//! 🧠 Knowledge graph:
//! - **NDJSON** (`NdjsonComposer`): one JSON value per line, trailing `\n`. Append-friendly.
//! - **JSON Array** (`JsonArrayComposer`): one pretty-printed array. Whole-file format.
//! - **TXT** (`TxtComposer`): one line per item, for the domain-only projection.
//! - **CSV** (`CsvComposer`, in `composers/csv.rs`): header from the first object's keys.
//! - Resolution: from [`OutputFormat`], same trait → impls → enum dispatcher pattern as
//!   everywhere else in this crate.
//!
//! Composers are pure: no I/O, no locks. The sink decides where the bytes land. 🦆

mod csv;

pub use csv::CsvComposer;

use serde_json::Value;

use crate::error::RepError;
use crate::sink::{OutputFormat, Payload};

// ===== Trait =====

/// 🎼 Assemble a payload into a wire-format string.
pub trait Composer: std::fmt::Debug {
    fn compose(&self, payload: &Payload) -> Result<String, RepError>;
}

// ===== NDJSON Composer =====

/// 📡 Newline-Delimited JSON - every record alone on its own line.
///
/// Lines payloads are written as JSON strings, so the file stays valid NDJSON no matter
/// what the caller handed over.
#[derive(Debug, Clone, Copy)]
pub struct NdjsonComposer;

impl Composer for NdjsonComposer {
    fn compose(&self, payload: &Payload) -> Result<String, RepError> {
        let mut out = String::new();
        match payload {
            Payload::Records(items) => {
                for item in items {
                    out.push_str(&serialize(item)?);
                    out.push('\n');
                }
            }
            Payload::Lines(lines) => {
                for line in lines {
                    out.push_str(&serialize(&Value::String(line.clone()))?);
                    out.push('\n');
                }
            }
        }
        // ✅ trailing \n included, so the next append starts on a fresh line
        Ok(out)
    }
}

// ===== JSON Array Composer =====

/// 📦 A pretty-printed JSON array. The whole file, every time.
#[derive(Debug, Clone, Copy)]
pub struct JsonArrayComposer;

impl JsonArrayComposer {
    /// 🔧 Render an already-merged list of values. The sink uses this after reading the
    /// existing array back in append mode.
    pub fn compose_values(&self, values: &[Value]) -> Result<String, RepError> {
        let mut out = serde_json::to_string_pretty(values)
            .map_err(|e| RepError::output("<json array>", e))?;
        out.push('\n');
        Ok(out)
    }
}

impl Composer for JsonArrayComposer {
    fn compose(&self, payload: &Payload) -> Result<String, RepError> {
        self.compose_values(&payload.to_values())
    }
}

// ===== TXT Composer =====

/// 📝 Plain lines. Only accepts line payloads; a record has no obvious one-line form.
#[derive(Debug, Clone, Copy)]
pub struct TxtComposer;

impl Composer for TxtComposer {
    fn compose(&self, payload: &Payload) -> Result<String, RepError> {
        match payload {
            Payload::Lines(lines) => {
                let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
                for line in lines {
                    out.push_str(line);
                    out.push('\n');
                }
                Ok(out)
            }
            Payload::Records(_) => Err(RepError::output(
                "<txt>",
                "txt output expects domain-only lines, got whole records",
            )),
        }
    }
}

// ===== Dispatcher Enum =====

/// 🎭 The polymorphic composer, resolved from the output format.
#[derive(Debug, Clone, Copy)]
pub enum ComposerBackend {
    Ndjson(NdjsonComposer),
    JsonArray(JsonArrayComposer),
    Txt(TxtComposer),
    Csv(CsvComposer),
}

impl ComposerBackend {
    /// 🔧 | OutputFormat | Composer |
    ///    |---|---|
    ///    | Ndjson | NdjsonComposer |
    ///    | Json | JsonArrayComposer |
    ///    | Txt | TxtComposer |
    ///    | Csv | CsvComposer |
    pub fn for_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Ndjson => Self::Ndjson(NdjsonComposer),
            OutputFormat::Json => Self::JsonArray(JsonArrayComposer),
            OutputFormat::Txt => Self::Txt(TxtComposer),
            OutputFormat::Csv => Self::Csv(CsvComposer),
        }
    }
}

impl Composer for ComposerBackend {
    fn compose(&self, payload: &Payload) -> Result<String, RepError> {
        match self {
            Self::Ndjson(c) => c.compose(payload),
            Self::JsonArray(c) => c.compose(payload),
            Self::Txt(c) => c.compose(payload),
            Self::Csv(c) => c.compose(payload),
        }
    }
}

fn serialize(value: &Value) -> Result<String, RepError> {
    serde_json::to_string(value).map_err(|e| RepError::output("<ndjson>", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ndjson_the_one_where_each_record_gets_its_own_line() {
        let payload = Payload::Records(vec![json!({"a": 1}), json!({"a": 2})]);
        let out = NdjsonComposer.compose(&payload).expect("💀 compose");
        assert_eq!(out, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn ndjson_the_one_where_lines_become_json_strings() {
        let payload = Payload::Lines(vec!["one.example".into()]);
        assert_eq!(NdjsonComposer.compose(&payload).expect("💀 compose"), "\"one.example\"\n");
    }

    #[test]
    fn ndjson_the_one_where_empty_payloads_produce_nothing() {
        let out = NdjsonComposer.compose(&Payload::Records(vec![])).expect("💀 compose");
        assert!(out.is_empty(), "Empty input → empty output. Zen.");
    }

    #[test]
    fn json_array_the_one_where_the_output_parses_back_as_an_array() {
        let payload = Payload::Records(vec![json!({"a": 1}), json!({"a": 2})]);
        let out = JsonArrayComposer.compose(&payload).expect("💀 compose");
        let back: Vec<Value> = serde_json::from_str(&out).expect("💀 valid JSON array");
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn txt_the_one_where_records_are_turned_away_at_the_door() {
        let payload = Payload::Records(vec![json!({"a": 1})]);
        assert!(matches!(TxtComposer.compose(&payload), Err(RepError::OutputWrite { .. })));
        let lines = Payload::Lines(vec!["a.example".into(), "b.example".into()]);
        assert_eq!(TxtComposer.compose(&lines).expect("💀 compose"), "a.example\nb.example\n");
    }

    #[test]
    fn dispatch_the_one_where_each_format_gets_its_composer() {
        assert!(matches!(ComposerBackend::for_format(OutputFormat::Ndjson), ComposerBackend::Ndjson(_)));
        assert!(matches!(ComposerBackend::for_format(OutputFormat::Json), ComposerBackend::JsonArray(_)));
        assert!(matches!(ComposerBackend::for_format(OutputFormat::Txt), ComposerBackend::Txt(_)));
        assert!(matches!(ComposerBackend::for_format(OutputFormat::Csv), ComposerBackend::Csv(_)));
    }
}
