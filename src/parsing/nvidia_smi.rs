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

// nvidia-smi CSV query output.
// Memory columns come back in MiB because of `nounits`.

use super::common::{optional_field, parse_csv_line, parse_number};
use super::types::{GpuProcess, GpuStatus};

pub const GPU_QUERY_ARGS: [&str; 2] = [
    "--query-gpu=index,uuid,pci.bus_id,utilization.gpu,utilization.memory,memory.used,memory.total,temperature.gpu",
    "--format=csv,noheader,nounits",
];

pub const COMPUTE_APPS_ARGS: [&str; 2] = [
    "--query-compute-apps=gpu_uuid,pid,used_memory",
    "--format=csv,noheader,nounits",
];

const MIB: f64 = 1024.0 * 1024.0;

fn optional_number(field: &str) -> Option<f64> {
    optional_field(field).and_then(parse_number::<f64>)
}

/// Parse `--query-gpu` output, one GPU per line.
///
/// Rows without an index or utilization readings are skipped.
pub fn parse_gpu_query(output: &str) -> Vec<GpuStatus> {
    let mut gpus = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parts = parse_csv_line(line);
        if parts.len() < 8 {
            tracing::debug!(line, "skipping short nvidia-smi row");
            continue;
        }

        let (Some(minor), Some(gpu_util), Some(mem_util)) = (
            optional_field(parts[0]).and_then(parse_number::<u32>),
            optional_number(parts[3]),
            optional_number(parts[4]),
        ) else {
            tracing::debug!(line, "skipping nvidia-smi row without utilization");
            continue;
        };

        gpus.push(GpuStatus {
            minor,
            uuid: optional_field(parts[1]).map(str::to_string),
            pci_bus_id: optional_field(parts[2]).map(str::to_string),
            gpu_util_percent: gpu_util,
            mem_util_percent: mem_util,
            mem_used_bytes: optional_number(parts[5]).map(|mib| mib * MIB),
            mem_total_bytes: optional_number(parts[6]).map(|mib| mib * MIB),
            temperature: optional_number(parts[7]),
        });
    }
    gpus
}

/// Parse `--query-compute-apps` output.
pub fn parse_compute_apps(output: &str) -> Vec<GpuProcess> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("No running"))
        .filter_map(|line| {
            let parts = parse_csv_line(line);
            if parts.len() < 3 {
                return None;
            }
            let gpu_uuid = optional_field(parts[0])?.to_string();
            let pid = parse_number::<u32>(parts[1])?;
            Some(GpuProcess {
                gpu_uuid,
                pid,
                used_memory_bytes: optional_number(parts[2]).map(|mib| mib * MIB),
            })
        })
        .collect()
}
