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

use serde_json::{Map, Value};

use super::common::{leading_json, optional_field, parse_number};
use super::types::GpuStatus;
use crate::error::ParseError;

pub const ROCM_SMI_ARGS: [&str; 5] = [
    "--showuse",
    "--showmemuse",
    "--showtemp",
    "--showuniqueid",
    "--json",
];

/// Parse `rocm-smi --json` output. Cards are keyed `card<N>`; other keys
/// (such as `system`) are ignored.
///
/// Key names drift between ROCm releases, so fields are matched by
/// substring rather than exact name.
pub fn parse_rocm_smi(output: &str) -> Result<Vec<GpuStatus>, ParseError> {
    let root: Map<String, Value> = leading_json(output, '{')?
        .ok_or_else(|| ParseError::Format("rocm-smi output holds no JSON object".to_string()))?;

    let mut gpus = Vec::new();
    for (key, card) in &root {
        let Some(minor) = key.strip_prefix("card").and_then(parse_number::<u32>) else {
            continue;
        };
        let Some(fields) = card.as_object() else {
            continue;
        };

        let gpu_util = find_number(fields, |k| k.contains("gpu use"));
        let mem_util = find_number(fields, |k| {
            k.contains("memory use") || k.contains("memory allocated") || k.contains("vram%")
        });
        let (Some(gpu_util), Some(mem_util)) = (gpu_util, mem_util) else {
            tracing::debug!(card = %key, "skipping rocm-smi card without utilization");
            continue;
        };

        let temperature = find_number(fields, |k| k.contains("temperature") && k.contains("edge"))
            .or_else(|| find_number(fields, |k| k.contains("temperature")));

        gpus.push(GpuStatus {
            minor,
            uuid: find_string(fields, |k| k.contains("unique id")),
            pci_bus_id: find_string(fields, |k| k.contains("pci bus")),
            gpu_util_percent: gpu_util,
            mem_util_percent: mem_util,
            mem_used_bytes: None,
            mem_total_bytes: None,
            temperature,
        });
    }

    gpus.sort_by_key(|g| g.minor);
    Ok(gpus)
}

fn find_value<'a>(fields: &'a Map<String, Value>, matches: impl Fn(&str) -> bool) -> Option<&'a Value> {
    fields
        .iter()
        .find(|(k, _)| matches(&k.to_ascii_lowercase()))
        .map(|(_, v)| v)
}

fn find_number(fields: &Map<String, Value>, matches: impl Fn(&str) -> bool) -> Option<f64> {
    match find_value(fields, matches)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => optional_field(s).and_then(parse_number::<f64>),
        _ => None,
    }
}

fn find_string(fields: &Map<String, Value>, matches: impl Fn(&str) -> bool) -> Option<String> {
    match find_value(fields, matches)? {
        Value::String(s) => optional_field(s).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
