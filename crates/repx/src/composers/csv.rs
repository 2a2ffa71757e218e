//! 📐 **CsvComposer** - records in, spreadsheet out.
//!
//! 🧠 Knowledge graph:
//! - The header row is the first record's field names, in declaration order
//!   (serde_json is built with `preserve_order`, so struct order survives).
//! - Every item must be a JSON object. Anything else is `RepError::CsvShape`.
//! - A missing field in a later row is an empty cell. Extra fields are not invented columns.
//! - Zero items → zero bytes. Not an error.
//! - Quoting: a cell with `,` `"` `\r` or `\n` is wrapped in quotes, inner quotes doubled.
//!   Framing is assembled by hand, same as the JSON array composer's brackets and commas.

use serde_json::{Map, Value};

use super::Composer;
use crate::error::RepError;
use crate::sink::Payload;

#[derive(Debug, Clone, Copy)]
pub struct CsvComposer;

impl Composer for CsvComposer {
    fn compose(&self, payload: &Payload) -> Result<String, RepError> {
        let items = match payload {
            Payload::Records(items) => items,
            Payload::Lines(lines) if lines.is_empty() => return Ok(String::new()),
            Payload::Lines(_) => return Err(RepError::CsvShape { index: 0 }),
        };

        let rows: Vec<&Map<String, Value>> = items
            .iter()
            .enumerate()
            .map(|(index, item)| item.as_object().ok_or(RepError::CsvShape { index }))
            .collect::<Result<_, _>>()?;

        let Some(&first) = rows.first() else {
            return Ok(String::new());
        };
        let header: Vec<&str> = first.keys().map(String::as_str).collect();

        let mut out = String::new();
        push_row(&mut out, header.iter().copied().map(std::borrow::Cow::Borrowed));
        for row in rows {
            push_row(
                &mut out,
                header.iter().map(|key| cell(row.get(*key))),
            );
        }
        Ok(out)
    }
}

fn cell(value: Option<&Value>) -> std::borrow::Cow<'_, str> {
    match value {
        None | Some(Value::Null) => "".into(),
        Some(Value::String(s)) => s.as_str().into(),
        Some(other) => other.to_string().into(),
    }
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = std::borrow::Cow<'a, str>>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if cell.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&cell);
        }
    }
    out.push('\n');
}
