//! InfluxDB line protocol.
//!
//! ```text
//! measurement,tag1=val1 field1=val1,field2=val2 timestamp
//! ```
//!
//! The same text is used as the `/write` request body and as the spool file
//! format, so a spool file can be fed to `influx -import` or `curl
//! --data-binary @file` unchanged.

use crate::batch::{Batch, Point, Precision};
use crate::error::LineProtocolError;

const SENSOR_TAG: &str = "sensor";
const VALUE_FIELD: &str = "value";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    /// Written with an `i` suffix.
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// A decoded line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    pub timestamp: Option<i64>,
}

impl ParsedLine {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Encodes one point without a trailing newline.
pub fn encode_point(point: &Point, precision: Precision) -> String {
    let mut line = escape_measurement(&point.measurement);
    line.push(',');
    line.push_str(&escape_key(SENSOR_TAG));
    line.push('=');
    line.push_str(&escape_key(&point.sensor));
    line.push(' ');
    line.push_str(&escape_key(VALUE_FIELD));
    line.push('=');
    line.push_str(&point.value.to_string());
    line.push(' ');
    line.push_str(&precision.timestamp(&point.timestamp).to_string());
    line
}

/// Encodes every point of `batch`, one newline-terminated line each.
pub fn encode_batch(batch: &Batch) -> String {
    let mut out = String::new();
    for point in batch.points() {
        out.push_str(&encode_point(point, batch.precision()));
        out.push('\n');
    }
    out
}

pub fn parse_line(line: &str) -> Result<ParsedLine, LineProtocolError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() || line.starts_with('#') {
        return Err(LineProtocolError::Empty);
    }

    // Quotes only delimit string field values; in the series they are literal.
    let (series, rest) =
        split_once_unescaped(line, ' ').ok_or(LineProtocolError::MissingFields)?;
    let sections = split_unescaped(rest, ' ', true);
    let (fields, timestamp) = match sections.as_slice() {
        [fields] => (*fields, None),
        [fields, ts] => (*fields, Some(*ts)),
        _ => return Err(LineProtocolError::MissingFields),
    };
    if fields.is_empty() {
        return Err(LineProtocolError::MissingFields);
    }

    let mut series_parts = split_unescaped(series, ',', false).into_iter();
    let measurement = unescape(series_parts.next().unwrap_or_default());
    if measurement.is_empty() {
        return Err(LineProtocolError::Empty);
    }

    let mut tags = Vec::new();
    for raw in series_parts {
        let (key, value) = split_once_unescaped(raw, '=')
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .ok_or_else(|| LineProtocolError::MalformedTag(raw.to_string()))?;
        tags.push((unescape(key), unescape(value)));
    }

    let mut parsed_fields = Vec::new();
    for raw in split_unescaped(fields, ',', true) {
        let (key, value) = split_once_unescaped(raw, '=')
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| LineProtocolError::MalformedField(raw.to_string()))?;
        let value = parse_field_value(value)
            .ok_or_else(|| LineProtocolError::MalformedField(raw.to_string()))?;
        parsed_fields.push((unescape(key), value));
    }

    let timestamp = match timestamp {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| LineProtocolError::InvalidTimestamp(raw.to_string()))?,
        ),
        None => None,
    };

    Ok(ParsedLine {
        measurement,
        tags,
        fields: parsed_fields,
        timestamp,
    })
}

fn parse_field_value(raw: &str) -> Option<FieldValue> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        return Some(FieldValue::String(
            inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        ));
    }
    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Some(FieldValue::Boolean(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Some(FieldValue::Boolean(false)),
        _ => {}
    }
    if let Some(int) = raw.strip_suffix('i') {
        return int.parse::<i64>().ok().map(FieldValue::Integer);
    }
    raw.parse::<f64>().ok().map(FieldValue::Float)
}

/// Splits on `sep` unless it is backslash-escaped or, with `quotes`, inside a
/// double-quoted string.
fn split_unescaped(s: &str, sep: char, quotes: bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut in_quotes = false;
    for (idx, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' if quotes => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&s[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn split_once_unescaped(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
        } else if ch == sep {
            return Some((&s[..idx], &s[idx + ch.len_utf8()..]));
        }
    }
    None
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, ',' | '=' | ' ') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Measurements escape commas and spaces.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys escape commas, equals signs and spaces.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
