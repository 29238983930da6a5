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

use std::collections::HashMap;

/// One GPU as reported by `nvidia-smi` or `rocm-smi`.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuStatus {
    pub minor: u32,
    pub uuid: Option<String>,
    pub pci_bus_id: Option<String>,
    pub gpu_util_percent: f64,
    pub mem_util_percent: f64,
    pub mem_used_bytes: Option<f64>,
    pub mem_total_bytes: Option<f64>,
    pub temperature: Option<f64>, // Celsius
}

/// A compute process holding a GPU context.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuProcess {
    pub gpu_uuid: String,
    pub pid: u32,
    pub used_memory_bytes: Option<f64>,
}

/// Everything one GPU query cycle produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuSnapshot {
    pub gpus: Vec<GpuStatus>,
    pub processes: Vec<GpuProcess>,
}

impl GpuSnapshot {
    /// Look a GPU up by minor index or uuid, the two forms used in
    /// `GPU_ID` labels and `NVIDIA_VISIBLE_DEVICES`.
    pub fn find(&self, id: &str) -> Option<&GpuStatus> {
        let id = id.trim();
        if let Ok(minor) = id.parse::<u32>() {
            return self.gpus.iter().find(|g| g.minor == minor);
        }
        self.gpus.iter().find(|g| g.uuid.as_deref() == Some(id))
    }

    pub fn by_uuid(&self, uuid: &str) -> Option<&GpuStatus> {
        self.gpus.iter().find(|g| g.uuid.as_deref() == Some(uuid))
    }
}

/// One row of `docker stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerStats {
    pub id: String,
    pub name: String,
    pub cpu_percent: f64,
    pub mem_usage_bytes: f64,
    pub mem_limit_bytes: f64,
    pub net_in_bytes: f64,
    pub net_out_bytes: f64,
    pub block_in_bytes: f64,
    pub block_out_bytes: f64,
    pub mem_percent: f64,
}

/// The parts of `docker inspect` the collector cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInspect {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub pid: Option<u32>,
}

/// One line of `ps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub state: char,
    pub pid: String,
    pub rss: u64, // KiB
    pub cmd: String,
}

impl ProcessRecord {
    /// Uninterruptible sleep, usually stuck on I/O or a driver call.
    pub fn is_blocked(&self) -> bool {
        self.state == 'D'
    }

    pub fn is_zombie(&self) -> bool {
        self.state == 'Z'
    }

    /// Program name without path or arguments.
    pub fn command_name(&self) -> &str {
        let program = self.cmd.split_whitespace().next().unwrap_or_default();
        // Kernel threads: `[kworker/u8:2]`
        if program.starts_with('[') {
            return program;
        }
        program.rsplit('/').next().unwrap_or(program)
    }
}
