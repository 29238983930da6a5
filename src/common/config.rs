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

use crate::error::{Error, Result};

/// Default bound on how long one cache lookup waits for a fresh value.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Default grace period during which a cached value may still be served.
pub const DEFAULT_OLD_DATA_TIMEOUT: Duration = Duration::from_secs(60);

/// Application configuration constants
pub struct AppConfig;

impl AppConfig {
    // HTTP
    pub const DEFAULT_PORT: u16 = 9102;

    // Data Collection
    pub const DEFAULT_INTERVAL_SECS: u64 = 30;
    pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_GET_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_OLD_DATA_TIMEOUT_SECS: u64 = 60;
    // nvidia-smi is the tool most prone to hanging, so it gets a longer grace period.
    pub const DEFAULT_GPU_OLD_DATA_TIMEOUT_SECS: u64 = 120;

    // External tools
    pub const DEFAULT_NVIDIA_SMI: &'static str = "nvidia-smi";
    pub const DEFAULT_ROCM_SMI: &'static str = "rocm-smi";
    pub const DEFAULT_DOCKER: &'static str = "docker";
    pub const DEFAULT_PS: &'static str = "ps";
    pub const DEFAULT_PROC_ROOT: &'static str = "/proc";
}

/// Which GPU query tool the node uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GpuType {
    Nvidia,
    Amd,
    None,
}

/// Paths (or bare names resolved through `PATH`) of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub nvidia_smi: String,
    pub rocm_smi: String,
    pub docker: String,
    pub ps: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            nvidia_smi: AppConfig::DEFAULT_NVIDIA_SMI.to_string(),
            rocm_smi: AppConfig::DEFAULT_ROCM_SMI.to_string(),
            docker: AppConfig::DEFAULT_DOCKER.to_string(),
            ps: AppConfig::DEFAULT_PS.to_string(),
        }
    }
}

/// Wait and staleness bounds of one cached source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTimeouts {
    pub get_timeout: Duration,
    pub old_data_timeout: Duration,
}

impl CacheTimeouts {
    pub fn new(get_timeout: Duration, old_data_timeout: Duration) -> Self {
        Self {
            get_timeout,
            old_data_timeout,
        }
    }
}

impl Default for CacheTimeouts {
    fn default() -> Self {
        Self::new(DEFAULT_GET_TIMEOUT, DEFAULT_OLD_DATA_TIMEOUT)
    }
}

/// Everything the collector core needs at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub interval: Duration,
    /// Hard limit for a single external command.
    pub command_timeout: Duration,
    pub gpu_type: GpuType,
    pub tools: ToolPaths,
    pub gpu_cache: CacheTimeouts,
    pub container_cache: CacheTimeouts,
    pub process_cache: CacheTimeouts,
    /// Root of the proc filesystem, used to map GPU processes to containers.
    pub proc_root: PathBuf,
    /// Text file to publish into; `None` disables the file sink.
    pub output: Option<PathBuf>,
    /// HTTP port; 0 disables the listener.
    pub port: u16,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let cache = CacheTimeouts::new(
            Duration::from_millis(AppConfig::DEFAULT_GET_TIMEOUT_MS),
            Duration::from_secs(AppConfig::DEFAULT_OLD_DATA_TIMEOUT_SECS),
        );
        Self {
            interval: Duration::from_secs(AppConfig::DEFAULT_INTERVAL_SECS),
            command_timeout: Duration::from_secs(AppConfig::DEFAULT_COMMAND_TIMEOUT_SECS),
            gpu_type: GpuType::Nvidia,
            tools: ToolPaths::default(),
            gpu_cache: CacheTimeouts::new(
                cache.get_timeout,
                Duration::from_secs(AppConfig::DEFAULT_GPU_OLD_DATA_TIMEOUT_SECS),
            ),
            container_cache: cache,
            process_cache: cache,
            proc_root: PathBuf::from(AppConfig::DEFAULT_PROC_ROOT),
            output: None,
            port: AppConfig::DEFAULT_PORT,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Config("interval must be greater than zero".to_string()));
        }
        if self.command_timeout.is_zero() {
            return Err(Error::Config(
                "command timeout must be greater than zero".to_string(),
            ));
        }
        if self.port == 0 && self.output.is_none() {
            return Err(Error::Config(
                "no sink configured: use --port or --output".to_string(),
            ));
        }
        Ok(())
    }
}
