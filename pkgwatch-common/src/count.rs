//! Lenient decoding of numeric fields.
//!
//! Producers have written counters both as JSON numbers and as strings, and
//! occasionally as garbage. Values are read the way an integer-prefix parse
//! would read them: `"12"` and `"12 pkgs"` are 12, anything without leading
//! digits is "not a number".

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

impl Loose {
    fn to_int(&self) -> Option<i64> {
        match self {
            Loose::Int(n) => Some(*n),
            Loose::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Loose::Float(_) => None,
            Loose::Text(s) => parse_int_prefix(s),
            Loose::Other(_) => None,
        }
    }

    fn to_text(&self) -> String {
        match self {
            Loose::Int(n) => n.to_string(),
            Loose::Float(f) => f.to_string(),
            Loose::Text(s) => s.clone(),
            Loose::Other(_) => String::new(),
        }
    }
}

/// Parse leading `[+-]digits` of `s`, ignoring leading whitespace.
pub fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Counter: missing or non-numeric reads as 0.
pub fn loose<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.to_int()).unwrap_or(0))
}

/// Timestamp or duration: missing or non-numeric reads as absent.
pub fn loose_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.to_int()))
}

/// Identifier that may have been written as a number.
pub fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(value.map(|v| v.to_text()).unwrap_or_default())
}

/// Optional text field. Numbers are kept as their decimal form, anything
/// else that is not a string reads as absent.
pub fn loose_string_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Loose::Other(_) => None,
        v => Some(v.to_text()),
    }))
}

/// Name → counter map, e.g. the per-package skip counts.
pub fn loose_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<BTreeMap<String, Option<Loose>>>::deserialize(deserializer)?;
    Ok(value
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let n = v.and_then(|v| v.to_int()).unwrap_or(0);
            (k, n)
        })
        .collect())
}
