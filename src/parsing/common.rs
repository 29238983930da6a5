// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Common parsing utilities for number extraction, unit conversion and field splitting.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::ParseError;

static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?)\s*([A-Za-z]*)\s*$")
        .expect("size regex is valid")
});

/// Parse a number from a string after sanitizing by removing commas, underscores, and trimming.
/// Returns None if parsing fails.
pub fn parse_number<T: FromStr>(s: &str) -> Option<T> {
    let cleaned = s.trim().replace([',', '_'], "");
    cleaned.parse::<T>().ok()
}

/// Multiplier for a size unit.
///
/// Binary units (`KiB`, `MiB`, ...) are powers of 1024, decimal units
/// (`kB`, `MB`, ...) powers of 1000. Matching is case-insensitive.
pub fn unit_multiplier(unit: &str) -> Option<f64> {
    let mul = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "KB" => 1_000.0,
        "KIB" => 1024.0,
        "MB" => 1_000_000.0,
        "MIB" => 1024.0_f64.powi(2),
        "GB" => 1_000_000_000.0,
        "GIB" => 1024.0_f64.powi(3),
        "TB" => 1_000_000_000_000.0,
        "TIB" => 1024.0_f64.powi(4),
        "PB" => 1_000_000_000_000_000.0,
        "PIB" => 1024.0_f64.powi(5),
        _ => return None,
    };
    Some(mul)
}

/// Convert a human-readable size such as `380.4MiB` or `1.2kB` into bytes.
pub fn parse_size(s: &str) -> Option<f64> {
    let caps = SIZE_RE.captures(s)?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    let mul = unit_multiplier(caps.get(2).map_or("", |m| m.as_str()))?;
    let bytes = number * mul;
    (bytes.is_finite() && bytes >= 0.0).then_some(bytes)
}

/// Parse `24.45%` into `24.45`. A missing `%` is tolerated.
pub fn parse_percent(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed);
    parse_number::<f64>(number).filter(|v| v.is_finite())
}

/// Split `"a / b"` into its two trimmed halves.
pub fn parse_pair(s: &str) -> Option<(&str, &str)> {
    let (left, right) = s.split_once('/')?;
    let (left, right) = (left.trim(), right.trim());
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, right))
}

/// Split a CSV line by comma, trimming whitespace around each field.
pub fn parse_csv_line(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// `[N/A]`, `[Not Supported]` and friends become `None`.
pub fn optional_field(field: &str) -> Option<&str> {
    let field = field.trim();
    if field.is_empty() || (field.starts_with('[') && field.ends_with(']')) || field == "N/A" {
        None
    } else {
        Some(field)
    }
}

/// Deserialize the first JSON value that starts at `open` (`[` or `{`).
///
/// Text before the value and anything after it is ignored: the executor
/// appends stderr to stdout, so warnings commonly trail the document.
/// Returns `None` when the output holds no such value.
pub fn leading_json<T: DeserializeOwned>(output: &str, open: char) -> Result<Option<T>, ParseError> {
    let Some(start) = output.find(open) else {
        return Ok(None);
    };
    let mut values = serde_json::Deserializer::from_str(&output[start..]).into_iter::<T>();
    match values.next() {
        Some(value) => Ok(Some(value?)),
        None => Ok(None),
    }
}
