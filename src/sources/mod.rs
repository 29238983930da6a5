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

//! One cached getter per external tool.

pub mod docker;
pub mod gpu;
pub mod process;

pub use docker::{DockerInspectGetter, DockerStatsGetter};
pub use gpu::{AmdGetter, NvidiaGetter};
pub use process::PsGetter;

use crate::cache::Singleton;
use crate::common::config::{CollectorConfig, GpuType};
use crate::exec::CommandExecutor;
use crate::parsing::{ContainerInspect, ContainerStats, GpuSnapshot, ProcessRecord};

pub const GPU_SOURCE: &str = "gpu";
pub const DOCKER_STATS_SOURCE: &str = "docker_stats";
pub const DOCKER_INSPECT_SOURCE: &str = "docker_inspect";
pub const PS_SOURCE: &str = "ps";

/// The singletons the collection loop reads every cycle.
///
/// Constructed explicitly and owned by the collector; there are no
/// process-wide caches.
#[derive(Debug)]
pub struct Sources {
    pub gpu: Option<Singleton<GpuSnapshot>>,
    pub container_stats: Singleton<Vec<ContainerStats>>,
    pub container_inspect: Singleton<Vec<ContainerInspect>>,
    pub processes: Singleton<Vec<ProcessRecord>>,
}

impl Sources {
    pub fn new(
        gpu: Option<Singleton<GpuSnapshot>>,
        container_stats: Singleton<Vec<ContainerStats>>,
        container_inspect: Singleton<Vec<ContainerInspect>>,
        processes: Singleton<Vec<ProcessRecord>>,
    ) -> Self {
        Self {
            gpu,
            container_stats,
            container_inspect,
            processes,
        }
    }

    /// Wire every source to the real tools named in `config`.
    pub fn from_config(config: &CollectorConfig, executor: &CommandExecutor) -> Self {
        let tools = &config.tools;
        let timeout = config.command_timeout;

        let gpu = match config.gpu_type {
            GpuType::Nvidia => Some(Singleton::new(
                GPU_SOURCE,
                NvidiaGetter::new(executor.clone(), tools.nvidia_smi.clone(), timeout),
                config.gpu_cache.get_timeout,
                config.gpu_cache.old_data_timeout,
            )),
            GpuType::Amd => Some(Singleton::new(
                GPU_SOURCE,
                AmdGetter::new(executor.clone(), tools.rocm_smi.clone(), timeout),
                config.gpu_cache.get_timeout,
                config.gpu_cache.old_data_timeout,
            )),
            GpuType::None => None,
        };

        let container_stats = Singleton::new(
            DOCKER_STATS_SOURCE,
            DockerStatsGetter::new(executor.clone(), tools.docker.clone(), timeout),
            config.container_cache.get_timeout,
            config.container_cache.old_data_timeout,
        );
        let container_inspect = Singleton::new(
            DOCKER_INSPECT_SOURCE,
            DockerInspectGetter::new(executor.clone(), tools.docker.clone(), timeout),
            config.container_cache.get_timeout,
            config.container_cache.old_data_timeout,
        );
        let processes = Singleton::new(
            PS_SOURCE,
            PsGetter::new(executor.clone(), tools.ps.clone(), timeout),
            config.process_cache.get_timeout,
            config.process_cache.old_data_timeout,
        );

        tracing::info!(
            gpu_type = ?config.gpu_type,
            command_timeout = ?timeout,
            "configured collection sources"
        );

        Self::new(gpu, container_stats, container_inspect, processes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_config_respects_gpu_type() {
        let executor = CommandExecutor::new();
        let config = CollectorConfig {
            gpu_type: GpuType::None,
            ..Default::default()
        };
        let sources = Sources::from_config(&config, &executor);
        assert!(sources.gpu.is_none());
        assert_eq!(sources.container_stats.name(), DOCKER_STATS_SOURCE);

        let config = CollectorConfig::default();
        let sources = Sources::from_config(&config, &executor);
        let gpu = sources.gpu.expect("nvidia source");
        assert_eq!(gpu.old_data_timeout(), Duration::from_secs(120));
    }
}
