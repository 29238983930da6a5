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

use super::common::{parse_csv_line, parse_pair, parse_percent, parse_size};
use super::types::ContainerStats;

/// Go template handed to `docker stats --format`.
pub const STATS_FORMAT: &str =
    "table {{.ID}},{{.Name}},{{.CPUPerc}},{{.MemUsage}},{{.NetIO}},{{.BlockIO}},{{.MemPerc}}";

const FIELD_COUNT: usize = 7;

/// Parse the comma-separated table printed with [`STATS_FORMAT`].
///
/// The header row and malformed rows are skipped.
pub fn parse_docker_stats(output: &str) -> Vec<ContainerStats> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_header(line))
        .filter_map(|line| {
            let parsed = parse_row(line);
            if parsed.is_none() {
                tracing::debug!(line, "skipping malformed docker stats row");
            }
            parsed
        })
        .collect()
}

fn is_header(line: &str) -> bool {
    line.starts_with("CONTAINER") || line.starts_with("ID,") || line.starts_with("NAME,")
}

fn parse_row(line: &str) -> Option<ContainerStats> {
    let fields = parse_csv_line(line);
    if fields.len() != FIELD_COUNT {
        return None;
    }

    let (mem_usage, mem_limit) = parse_pair(fields[3])?;
    let (net_in, net_out) = parse_pair(fields[4])?;
    let (block_in, block_out) = parse_pair(fields[5])?;

    Some(ContainerStats {
        id: fields[0].to_string(),
        name: fields[1].to_string(),
        cpu_percent: parse_percent(fields[2])?,
        mem_usage_bytes: parse_size(mem_usage)?,
        mem_limit_bytes: parse_size(mem_limit)?,
        net_in_bytes: parse_size(net_in)?,
        net_out_bytes: parse_size(net_out)?,
        block_in_bytes: parse_size(block_in)?,
        block_out_bytes: parse_size(block_out)?,
        mem_percent: parse_percent(fields[6])?,
    })
}
