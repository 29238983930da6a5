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

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::common::config::{AppConfig, CacheTimeouts, CollectorConfig, GpuType, ToolPaths};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The port to serve /metrics and /healthz on. Use 0 to disable the HTTP listener.
    #[arg(short, long, default_value_t = AppConfig::DEFAULT_PORT)]
    pub port: u16,
    /// Seconds between collection cycles.
    #[arg(short, long, default_value_t = AppConfig::DEFAULT_INTERVAL_SECS)]
    pub interval: u64,
    /// Also publish each snapshot to this file (textfile collector format).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// GPU vendor tool to query.
    #[arg(long, value_enum, default_value_t = GpuType::Nvidia)]
    pub gpu_type: GpuType,
    #[arg(long, default_value = AppConfig::DEFAULT_NVIDIA_SMI)]
    pub nvidia_smi: String,
    #[arg(long, default_value = AppConfig::DEFAULT_ROCM_SMI)]
    pub rocm_smi: String,
    #[arg(long, default_value = AppConfig::DEFAULT_DOCKER)]
    pub docker: String,
    #[arg(long, default_value = AppConfig::DEFAULT_PS)]
    pub ps: String,
    /// Seconds an external command may run before it is killed.
    #[arg(long, default_value_t = AppConfig::DEFAULT_COMMAND_TIMEOUT_SECS)]
    pub command_timeout: u64,
    /// Milliseconds a cycle waits for a fresh value from each source.
    #[arg(long, default_value_t = AppConfig::DEFAULT_GET_TIMEOUT_MS)]
    pub get_timeout_ms: u64,
    /// Seconds a cached container or process value may still be served.
    #[arg(long, default_value_t = AppConfig::DEFAULT_OLD_DATA_TIMEOUT_SECS)]
    pub old_data_timeout: u64,
    /// Seconds a cached GPU value may still be served.
    #[arg(long, default_value_t = AppConfig::DEFAULT_GPU_OLD_DATA_TIMEOUT_SECS)]
    pub gpu_old_data_timeout: u64,
    /// Root of the proc filesystem used to map GPU processes to containers.
    #[arg(long, default_value = AppConfig::DEFAULT_PROC_ROOT)]
    pub proc_root: PathBuf,
}

impl Cli {
    pub fn into_config(self) -> CollectorConfig {
        let get_timeout = Duration::from_millis(self.get_timeout_ms);
        let cache = CacheTimeouts::new(get_timeout, Duration::from_secs(self.old_data_timeout));
        CollectorConfig {
            interval: Duration::from_secs(self.interval),
            command_timeout: Duration::from_secs(self.command_timeout),
            gpu_type: self.gpu_type,
            tools: ToolPaths {
                nvidia_smi: self.nvidia_smi,
                rocm_smi: self.rocm_smi,
                docker: self.docker,
                ps: self.ps,
            },
            gpu_cache: CacheTimeouts::new(
                get_timeout,
                Duration::from_secs(self.gpu_old_data_timeout),
            ),
            container_cache: cache,
            process_cache: cache,
            proc_root: self.proc_root,
            output: self.output,
            port: self.port,
        }
    }
}
