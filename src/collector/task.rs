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

use super::exporter::FamilyExporter;
use super::merge::ContainerSnapshot;
use crate::error::CollectError;
use crate::metrics::MetricFamily;
use crate::parsing::{ContainerStats, GpuSnapshot};

/// Per-container resource usage labelled with the task it runs.
pub struct TaskMetricExporter<'a> {
    containers: &'a [ContainerSnapshot],
}

impl<'a> TaskMetricExporter<'a> {
    pub fn new(containers: &'a [ContainerSnapshot]) -> Self {
        Self { containers }
    }
}

type StatsField = fn(&ContainerStats) -> f64;

const TASK_GAUGES: [(&str, &str, StatsField); 8] = [
    ("task_cpu_percent", "CPU usage of a task in percent", |s| s.cpu_percent),
    ("task_mem_usage_bytes", "Memory used by a task in bytes", |s| s.mem_usage_bytes),
    ("task_mem_limit_bytes", "Memory limit of a task in bytes", |s| s.mem_limit_bytes),
    ("task_mem_usage_percent", "Memory usage of a task in percent of its limit", |s| {
        s.mem_percent
    }),
    ("task_net_in_bytes", "Bytes received by a task", |s| s.net_in_bytes),
    ("task_net_out_bytes", "Bytes sent by a task", |s| s.net_out_bytes),
    ("task_block_in_bytes", "Bytes read from block devices by a task", |s| s.block_in_bytes),
    ("task_block_out_bytes", "Bytes written to block devices by a task", |s| {
        s.block_out_bytes
    }),
];

impl FamilyExporter for TaskMetricExporter<'_> {
    fn family(&self) -> &'static str {
        "task"
    }

    fn export(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let mut families: Vec<MetricFamily> = TASK_GAUGES
            .iter()
            .map(|(name, help, _)| MetricFamily::gauge(*name, *help))
            .collect();

        for container in self.containers {
            let labels = container.task_labels();
            for (family, (_, _, field)) in families.iter_mut().zip(TASK_GAUGES.iter()) {
                family.add(labels.clone(), field(&container.stats));
            }
        }

        Ok(families)
    }
}

/// GPU usage attributed to the containers the GPUs are assigned to.
pub struct TaskGpuMetricExporter<'a> {
    containers: &'a [ContainerSnapshot],
    gpus: &'a GpuSnapshot,
}

impl<'a> TaskGpuMetricExporter<'a> {
    pub fn new(containers: &'a [ContainerSnapshot], gpus: &'a GpuSnapshot) -> Self {
        Self { containers, gpus }
    }
}

impl FamilyExporter for TaskGpuMetricExporter<'_> {
    fn family(&self) -> &'static str {
        "task_gpu"
    }

    fn export(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let mut gpu_percent =
            MetricFamily::gauge("task_gpu_percent", "Utilization of a GPU assigned to a task");
        let mut gpu_mem_percent = MetricFamily::gauge(
            "task_gpu_mem_percent",
            "Memory utilization of a GPU assigned to a task",
        );

        for container in self.containers {
            let labels = container.task_labels();
            for gpu in container.gpus(self.gpus) {
                let mut gpu_labels = labels.clone();
                gpu_labels.push(("minor_number", gpu.minor.to_string()));
                gpu_percent.add(gpu_labels.clone(), gpu.gpu_util_percent);
                gpu_mem_percent.add(gpu_labels, gpu.mem_util_percent);
            }
        }

        Ok(vec![gpu_percent, gpu_mem_percent])
    }
}
