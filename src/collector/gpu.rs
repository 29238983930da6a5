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

use std::collections::HashSet;

use super::exporter::FamilyExporter;
use crate::common::config::GpuType;
use crate::error::CollectError;
use crate::metrics::MetricFamily;
use crate::parsing::{GpuSnapshot, GpuStatus};

pub struct GpuMetricExporter<'a> {
    snapshot: &'a GpuSnapshot,
    prefix: &'static str,
}

impl<'a> GpuMetricExporter<'a> {
    pub fn new(snapshot: &'a GpuSnapshot, gpu_type: GpuType) -> Self {
        let prefix = match gpu_type {
            GpuType::Amd => "rocmsmi",
            GpuType::Nvidia | GpuType::None => "nvidiasmi",
        };
        Self { snapshot, prefix }
    }

    fn base_labels(info: &GpuStatus) -> Vec<(&'static str, String)> {
        let mut labels = vec![("minor_number", info.minor.to_string())];
        if let Some(uuid) = &info.uuid {
            labels.push(("uuid", uuid.clone()));
        }
        labels
    }
}

impl FamilyExporter for GpuMetricExporter<'_> {
    fn family(&self) -> &'static str {
        "gpu"
    }

    fn export(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let mut seen = HashSet::new();
        if let Some(dup) = self.snapshot.gpus.iter().find(|g| !seen.insert(g.minor)) {
            return Err(CollectError::Merge(format!(
                "GPU minor number {} reported twice",
                dup.minor
            )));
        }

        let p = self.prefix;
        let mut utilization =
            MetricFamily::gauge(format!("{p}_utilization_gpu"), "GPU utilization percentage");
        let mut mem_utilization = MetricFamily::gauge(
            format!("{p}_utilization_memory"),
            "GPU memory utilization percentage",
        );
        let mut mem_used =
            MetricFamily::gauge(format!("{p}_memory_used_bytes"), "GPU memory used in bytes");
        let mut mem_total =
            MetricFamily::gauge(format!("{p}_memory_total_bytes"), "GPU memory total in bytes");
        let mut temperature = MetricFamily::gauge(
            format!("{p}_temperature_celsius"),
            "GPU temperature in celsius",
        );

        for info in &self.snapshot.gpus {
            let labels = Self::base_labels(info);
            utilization.add(labels.clone(), info.gpu_util_percent);
            mem_utilization.add(labels.clone(), info.mem_util_percent);
            if let Some(used) = info.mem_used_bytes {
                mem_used.add(labels.clone(), used);
            }
            if let Some(total) = info.mem_total_bytes {
                mem_total.add(labels.clone(), total);
            }
            if let Some(celsius) = info.temperature {
                temperature.add(labels, celsius);
            }
        }

        Ok(vec![
            utilization,
            mem_utilization,
            mem_used,
            mem_total,
            temperature,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::render;

    fn gpu(minor: u32) -> GpuStatus {
        GpuStatus {
            minor,
            uuid: Some(format!("GPU-{minor}")),
            pci_bus_id: None,
            gpu_util_percent: 98.0,
            mem_util_percent: 40.0,
            mem_used_bytes: Some(1024.0),
            mem_total_bytes: None,
            temperature: Some(65.0),
        }
    }

    #[test]
    fn test_nvidia_families() {
        let snapshot = GpuSnapshot {
            gpus: vec![gpu(0), gpu(1)],
            processes: vec![],
        };
        let families = GpuMetricExporter::new(&snapshot, GpuType::Nvidia)
            .export()
            .unwrap();
        let text = render(&families);
        assert!(text.contains("nvidiasmi_utilization_gpu{minor_number=\"0\",uuid=\"GPU-0\"} 98\n"));
        assert!(text.contains("nvidiasmi_utilization_memory{minor_number=\"1\",uuid=\"GPU-1\"} 40\n"));
        assert!(text.contains("nvidiasmi_temperature_celsius"));
        // Unknown totals are omitted, not reported as zero.
        assert!(!text.contains("nvidiasmi_memory_total_bytes"));
    }

    #[test]
    fn test_amd_prefix() {
        let snapshot = GpuSnapshot {
            gpus: vec![gpu(0)],
            processes: vec![],
        };
        let families = GpuMetricExporter::new(&snapshot, GpuType::Amd)
            .export()
            .unwrap();
        assert_eq!(families[0].name, "rocmsmi_utilization_gpu");
    }

    #[test]
    fn test_duplicate_minor_is_an_error() {
        let snapshot = GpuSnapshot {
            gpus: vec![gpu(0), gpu(0)],
            processes: vec![],
        };
        let err = GpuMetricExporter::new(&snapshot, GpuType::Nvidia)
            .export()
            .unwrap_err();
        assert!(matches!(err, CollectError::Merge(_)));
    }
}
