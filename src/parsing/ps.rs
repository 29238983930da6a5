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

use super::types::ProcessRecord;

/// Empty headers (`=`) keep the output free of a title row.
pub const PS_ARGS: [&str; 3] = ["-ax", "-o", "state=,pid=,rss=,args="];

/// Parse `ps -ax -o state=,pid=,rss=,args=`.
pub fn parse_ps(output: &str) -> Vec<ProcessRecord> {
    output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<ProcessRecord> {
    let mut rest = line.trim_start();

    let (state, tail) = next_field(rest)?;
    rest = tail;
    let (pid, tail) = next_field(rest)?;
    rest = tail;
    let (rss, tail) = next_field(rest)?;

    // `ps` may print multi-letter states such as `Ss+`; the first letter is the state.
    let state = state.chars().next()?;
    if !pid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(ProcessRecord {
        state,
        pid: pid.to_string(),
        rss: rss.parse().ok()?,
        cmd: tail.trim().to_string(),
    })
}

fn next_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(end) => Some((&s[..end], &s[end..])),
        None => Some((s, "")),
    }
}

/// Processes in uninterruptible sleep.
pub fn blocked_count(processes: &[ProcessRecord]) -> usize {
    processes.iter().filter(|p| p.is_blocked()).count()
}

pub fn zombie_count(processes: &[ProcessRecord]) -> usize {
    processes.iter().filter(|p| p.is_zombie()).count()
}
