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

// Flags GPUs used by something the scheduler does not know about:
// a host process, or a container that is no longer running.

use std::collections::HashMap;
use std::path::Path;

use super::exporter::FamilyExporter;
use super::merge::ContainerSnapshot;
use crate::error::CollectError;
use crate::metrics::MetricFamily;
use crate::parsing::cgroup::container_id_from_cgroup;
use crate::parsing::GpuSnapshot;

/// Where a GPU process lives: `None` for the host, otherwise a container id.
pub type PidOwners = HashMap<u32, Option<String>>;

/// Map every GPU process to its container by reading `<proc_root>/<pid>/cgroup`.
///
/// Processes that exited before their cgroup file could be read are left out.
pub async fn resolve_pid_owners(proc_root: &Path, snapshot: &GpuSnapshot) -> PidOwners {
    let mut owners = PidOwners::new();
    for process in &snapshot.processes {
        if owners.contains_key(&process.pid) {
            continue;
        }
        let path = proc_root.join(process.pid.to_string()).join("cgroup");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                owners.insert(process.pid, container_id_from_cgroup(&content));
            }
            Err(e) => {
                tracing::debug!(pid = process.pid, error = %e, "cannot read cgroup of GPU process");
            }
        }
    }
    owners
}

pub struct GpuOwnershipExporter<'a> {
    gpus: &'a GpuSnapshot,
    owners: &'a PidOwners,
    /// Running containers; `None` when container stats are unavailable this
    /// cycle, in which case zombie detection is skipped.
    running: Option<&'a [ContainerSnapshot]>,
}

impl<'a> GpuOwnershipExporter<'a> {
    pub fn new(
        gpus: &'a GpuSnapshot,
        owners: &'a PidOwners,
        running: Option<&'a [ContainerSnapshot]>,
    ) -> Self {
        Self {
            gpus,
            owners,
            running,
        }
    }
}

impl FamilyExporter for GpuOwnershipExporter<'_> {
    fn family(&self) -> &'static str {
        "gpu_ownership"
    }

    fn export(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let mut external = MetricFamily::gauge(
            "gpu_used_by_external_process",
            "GPU used by a process outside any container",
        );
        let mut zombie = MetricFamily::gauge(
            "gpu_used_by_zombie_container",
            "GPU used by a container that is no longer running",
        );

        for process in &self.gpus.processes {
            let Some(gpu) = self.gpus.by_uuid(&process.gpu_uuid) else {
                tracing::debug!(uuid = %process.gpu_uuid, pid = process.pid, "GPU process on unknown device");
                continue;
            };
            let Some(owner) = self.owners.get(&process.pid) else {
                continue;
            };
            let minor = gpu.minor.to_string();

            match owner {
                None => {
                    external.add(
                        [("minor_number", minor), ("pid", process.pid.to_string())],
                        1u64,
                    );
                }
                Some(container_id) => {
                    let Some(running) = self.running else {
                        continue;
                    };
                    if !running.iter().any(|c| c.matches_id(container_id)) {
                        zombie.add(
                            [
                                ("minor_number", minor),
                                ("container_id", container_id.clone()),
                            ],
                            1u64,
                        );
                    }
                }
            }
        }

        Ok(vec![external, zombie])
    }
}
