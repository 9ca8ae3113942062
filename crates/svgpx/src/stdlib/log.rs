//! `log(values…)` (spec §4.8, §6).
//!
//! A log argument that is itself a string *literal* contributes a plain
//! string part; every other argument contributes a labeled value part whose
//! label is the original source text of that argument expression (spec §9
//! open question: "the source text of the argument expression").

use serde::Serialize;

use crate::value::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LogPart {
    String { value: String },
    Value { label: String, value: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub line: u32,
    pub parts: Vec<LogPart>,
}

pub fn string_part(text: &str) -> LogPart {
    LogPart::String { value: text.to_string() }
}

pub fn value_part(label: &str, value: &Value) -> LogPart {
    LogPart::Value { label: label.to_string(), value: value.display_form() }
}
