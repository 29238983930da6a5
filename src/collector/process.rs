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

use std::collections::BTreeMap;

use super::exporter::FamilyExporter;
use crate::error::CollectError;
use crate::metrics::MetricFamily;
use crate::parsing::ps::{blocked_count, zombie_count};
use crate::parsing::ProcessRecord;

pub struct ProcessMetricExporter<'a> {
    processes: &'a [ProcessRecord],
}

impl<'a> ProcessMetricExporter<'a> {
    pub fn new(processes: &'a [ProcessRecord]) -> Self {
        Self { processes }
    }
}

impl FamilyExporter for ProcessMetricExporter<'_> {
    fn family(&self) -> &'static str {
        "process"
    }

    fn export(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let no_labels: [(&str, &str); 0] = [];

        let mut blocked = MetricFamily::gauge(
            "process_blocked_count",
            "Processes in uninterruptible sleep (state D)",
        );
        blocked.add(no_labels, blocked_count(self.processes));

        let mut zombies = MetricFamily::gauge("process_zombie_count", "Zombie processes (state Z)");
        zombies.add(no_labels, zombie_count(self.processes));

        // Which programs are stuck tells whether a driver or a filesystem is to blame.
        let mut by_command: BTreeMap<&str, usize> = BTreeMap::new();
        for process in self.processes.iter().filter(|p| p.is_blocked()) {
            *by_command.entry(process.command_name()).or_default() += 1;
        }
        let mut per_command = MetricFamily::gauge(
            "process_count",
            "Processes in a problematic state, by command",
        );
        for (command, count) in by_command {
            per_command.add([("state", "D"), ("command", command)], count);
        }

        Ok(vec![blocked, zombies, per_command])
    }
}
