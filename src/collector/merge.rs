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

//! Joins between datasets produced by independent tools.
//!
//! Each tool observes its own point in time, so every join tolerates the key
//! being missing on the other side.

use std::collections::HashMap;

use crate::parsing::{ContainerInspect, ContainerStats, GpuSnapshot, GpuStatus};

/// Docker label carrying the GPUs assigned to a container.
pub const GPU_ID_LABEL: &str = "GPU_ID";
/// Fallback when the scheduler did not label the container.
pub const VISIBLE_DEVICES_ENV: &str = "NVIDIA_VISIBLE_DEVICES";

/// Exported label name and the label/env keys it is read from, in priority order.
const JOB_LABELS: [(&str, &[&str]); 4] = [
    ("job_name", &["PAI_JOB_NAME"]),
    ("username", &["PAI_USER_NAME"]),
    ("task_role", &["PAI_CURRENT_TASK_ROLE_NAME", "PAI_TASK_ROLE_NAME"]),
    (
        "task_index",
        &["PAI_CURRENT_TASK_ROLE_CURRENT_TASK_INDEX", "PAI_TASK_INDEX"],
    ),
];

/// `docker stats` row joined with its `docker inspect` entry, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSnapshot {
    pub stats: ContainerStats,
    pub inspect: Option<ContainerInspect>,
}

impl ContainerSnapshot {
    /// Full id when inspect data is available, otherwise the short stats id.
    pub fn id(&self) -> &str {
        self.inspect
            .as_ref()
            .map_or(self.stats.id.as_str(), |i| i.id.as_str())
    }

    /// Whether `id` (short or full) names this container.
    pub fn matches_id(&self, id: &str) -> bool {
        !id.is_empty()
            && !self.stats.id.is_empty()
            && (id.starts_with(&self.stats.id) || self.stats.id.starts_with(id))
    }

    fn lookup(&self, keys: &[&str]) -> Option<&str> {
        let inspect = self.inspect.as_ref()?;
        keys.iter().find_map(|key| {
            inspect
                .labels
                .get(*key)
                .or_else(|| inspect.env.get(*key))
                .map(String::as_str)
                .filter(|v| !v.is_empty())
        })
    }

    /// Labels identifying the task running in this container.
    pub fn task_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![
            ("container_id", self.id().to_string()),
            ("container_name", self.stats.name.clone()),
        ];
        for (label, keys) in JOB_LABELS {
            if let Some(value) = self.lookup(keys) {
                labels.push((label, value.to_string()));
            }
        }
        labels
    }

    /// GPU identifiers (minor indexes or uuids) assigned to this container.
    pub fn gpu_ids(&self) -> Vec<String> {
        let Some(inspect) = self.inspect.as_ref() else {
            return Vec::new();
        };
        let raw = inspect
            .labels
            .get(GPU_ID_LABEL)
            .or_else(|| inspect.env.get(VISIBLE_DEVICES_ENV))
            .map(String::as_str)
            .unwrap_or_default();

        match raw.trim() {
            "" | "none" | "void" | "NoDevFiles" => Vec::new(),
            list => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Resolve [`gpu_ids`](Self::gpu_ids) against a GPU snapshot.
    ///
    /// `all` expands to every GPU; ids missing from the snapshot are skipped.
    pub fn gpus<'a>(&self, snapshot: &'a GpuSnapshot) -> Vec<&'a GpuStatus> {
        let ids = self.gpu_ids();
        if ids.iter().any(|id| id == "all") {
            return snapshot.gpus.iter().collect();
        }
        ids.iter()
            .filter_map(|id| {
                let gpu = snapshot.find(id);
                if gpu.is_none() {
                    tracing::debug!(
                        container = %self.stats.name,
                        gpu_id = %id,
                        "container references a GPU missing from this cycle's snapshot"
                    );
                }
                gpu
            })
            .collect()
    }
}

/// Join stats rows with inspect entries by container id.
///
/// Stats rows without an inspect entry are kept with no labels, env or pid.
/// Inspect entries without a stats row are dropped.
pub fn merge_containers(
    stats: &[ContainerStats],
    inspect: Option<&[ContainerInspect]>,
) -> Vec<ContainerSnapshot> {
    let by_id: HashMap<&str, &ContainerInspect> = inspect
        .unwrap_or_default()
        .iter()
        .map(|i| (i.id.as_str(), i))
        .collect();

    stats
        .iter()
        .map(|row| {
            let matched = by_id.get(row.id.as_str()).copied().or_else(|| {
                by_id
                    .iter()
                    .find(|(id, _)| !row.id.is_empty() && id.starts_with(row.id.as_str()))
                    .map(|(_, i)| *i)
            });
            if matched.is_none() && inspect.is_some() {
                tracing::debug!(container = %row.id, "no inspect entry for container");
            }
            ContainerSnapshot {
                stats: row.clone(),
                inspect: matched.cloned(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(id: &str, name: &str) -> ContainerStats {
        ContainerStats {
            id: id.to_string(),
            name: name.to_string(),
            cpu_percent: 1.0,
            mem_usage_bytes: 2.0,
            mem_limit_bytes: 3.0,
            net_in_bytes: 4.0,
            net_out_bytes: 5.0,
            block_in_bytes: 6.0,
            block_out_bytes: 7.0,
            mem_percent: 8.0,
        }
    }

    fn inspect(id: &str, labels: &[(&str, &str)], env: &[(&str, &str)]) -> ContainerInspect {
        ContainerInspect {
            id: id.to_string(),
            name: String::new(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            pid: Some(1),
        }
    }

    fn gpu(minor: u32, uuid: &str) -> GpuStatus {
        GpuStatus {
            minor,
            uuid: Some(uuid.to_string()),
            pci_bus_id: None,
            gpu_util_percent: 10.0 * f64::from(minor),
            mem_util_percent: 0.0,
            mem_used_bytes: None,
            mem_total_bytes: None,
            temperature: None,
        }
    }

    #[test]
    fn test_merge_by_id_prefix() {
        let rows = [stats("aaaa", "job-a"), stats("bbbb", "job-b")];
        let inspected = [inspect("aaaa1111", &[("PAI_JOB_NAME", "alice~train")], &[])];

        let merged = merge_containers(&rows, Some(&inspected[..]));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id(), "aaaa1111");
        assert!(merged[0].inspect.is_some());
        assert_eq!(merged[1].id(), "bbbb");
        assert!(merged[1].inspect.is_none());
    }

    #[test]
    fn test_merge_without_inspect_source() {
        let rows = [stats("aaaa", "job-a")];
        let merged = merge_containers(&rows, None);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].task_labels(),
            vec![
                ("container_id", "aaaa".to_string()),
                ("container_name", "job-a".to_string())
            ]
        );
        assert!(merged[0].gpu_ids().is_empty());
    }

    #[test]
    fn test_task_labels_prefer_docker_labels_over_env() {
        let snapshot = ContainerSnapshot {
            stats: stats("aaaa", "job-a"),
            inspect: Some(inspect(
                "aaaa1111",
                &[("PAI_JOB_NAME", "from-label")],
                &[
                    ("PAI_JOB_NAME", "from-env"),
                    ("PAI_USER_NAME", "alice"),
                    ("PAI_TASK_INDEX", "2"),
                ],
            )),
        };
        let labels = snapshot.task_labels();
        assert_eq!(labels[0], ("container_id", "aaaa1111".to_string()));
        assert!(labels.contains(&("job_name", "from-label".to_string())));
        assert!(labels.contains(&("username", "alice".to_string())));
        assert!(labels.contains(&("task_index", "2".to_string())));
        assert!(!labels.iter().any(|(k, _)| *k == "task_role"));
    }

    #[test]
    fn test_gpu_ids_from_label_or_env() {
        let labelled = ContainerSnapshot {
            stats: stats("aaaa", "a"),
            inspect: Some(inspect("aaaa", &[("GPU_ID", "0, 2")], &[])),
        };
        assert_eq!(labelled.gpu_ids(), vec!["0", "2"]);

        let env_only = ContainerSnapshot {
            stats: stats("bbbb", "b"),
            inspect: Some(inspect("bbbb", &[], &[("NVIDIA_VISIBLE_DEVICES", "GPU-x")])),
        };
        assert_eq!(env_only.gpu_ids(), vec!["GPU-x"]);

        let none = ContainerSnapshot {
            stats: stats("cccc", "c"),
            inspect: Some(inspect("cccc", &[], &[("NVIDIA_VISIBLE_DEVICES", "void")])),
        };
        assert!(none.gpu_ids().is_empty());
    }

    #[test]
    fn test_gpus_skips_unknown_ids() {
        let snapshot = GpuSnapshot {
            gpus: vec![gpu(0, "GPU-a"), gpu(1, "GPU-b")],
            processes: vec![],
        };
        let container = ContainerSnapshot {
            stats: stats("aaaa", "a"),
            inspect: Some(inspect("aaaa", &[("GPU_ID", "1,7,GPU-a")], &[])),
        };
        let minors: Vec<u32> = container.gpus(&snapshot).iter().map(|g| g.minor).collect();
        assert_eq!(minors, vec![1, 0]);

        let everything = ContainerSnapshot {
            stats: stats("bbbb", "b"),
            inspect: Some(inspect("bbbb", &[], &[("NVIDIA_VISIBLE_DEVICES", "all")])),
        };
        assert_eq!(everything.gpus(&snapshot).len(), 2);
    }

    #[test]
    fn test_matches_id() {
        let container = ContainerSnapshot {
            stats: stats("aaaa", "a"),
            inspect: None,
        };
        assert!(container.matches_id("aaaa1111"));
        assert!(container.matches_id("aaaa"));
        assert!(!container.matches_id("bbbb"));
        assert!(!container.matches_id(""));
    }
}
