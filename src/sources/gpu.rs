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

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::Getter;
use crate::error::CollectError;
use crate::exec::CommandExecutor;
use crate::parsing::nvidia_smi::{
    parse_compute_apps, parse_gpu_query, COMPUTE_APPS_ARGS, GPU_QUERY_ARGS,
};
use crate::parsing::rocm_smi::{parse_rocm_smi, ROCM_SMI_ARGS};
use crate::parsing::GpuSnapshot;

/// Queries NVIDIA GPUs and their compute processes through `nvidia-smi`.
pub struct NvidiaGetter {
    executor: CommandExecutor,
    program: String,
    timeout: Duration,
}

impl NvidiaGetter {
    pub fn new(executor: CommandExecutor, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor,
            program: program.into(),
            timeout,
        }
    }

    fn argv(&self, args: &[&str]) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }
}

#[async_trait]
impl Getter<GpuSnapshot> for NvidiaGetter {
    async fn get(&self) -> Result<GpuSnapshot, CollectError> {
        let output = self
            .executor
            .execute(&self.argv(&GPU_QUERY_ARGS), self.timeout)
            .await?;
        let gpus = parse_gpu_query(&output);
        if gpus.is_empty() && !output.trim().is_empty() {
            return Err(CollectError::Other(format!(
                "nvidia-smi returned no parsable GPU rows: {}",
                output.lines().next().unwrap_or_default()
            )));
        }

        // GPU status is still worth publishing when the process query fails.
        let processes = match self
            .executor
            .execute(&self.argv(&COMPUTE_APPS_ARGS), self.timeout)
            .await
        {
            Ok(output) => parse_compute_apps(&output),
            Err(e) => {
                tracing::warn!(error = %e, "nvidia-smi compute-apps query failed");
                Vec::new()
            }
        };

        Ok(GpuSnapshot { gpus, processes })
    }
}

/// Queries AMD GPUs through `rocm-smi`. Per-process ownership is not reported.
pub struct AmdGetter {
    executor: CommandExecutor,
    program: String,
    timeout: Duration,
}

impl AmdGetter {
    pub fn new(executor: CommandExecutor, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor,
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Getter<GpuSnapshot> for AmdGetter {
    async fn get(&self) -> Result<GpuSnapshot, CollectError> {
        let mut argv = vec![self.program.clone()];
        argv.extend(ROCM_SMI_ARGS.iter().map(|a| a.to_string()));

        let output = self.executor.execute(&argv, self.timeout).await?;
        let gpus = parse_rocm_smi(&output)?;
        Ok(GpuSnapshot {
            gpus,
            processes: Vec::new(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// Shell script standing in for a GPU tool.
    fn fake_tool(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_nvidia_getter_parses_both_queries() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            &dir,
            "nvidia-smi",
            r#"case "$1" in
  --query-gpu=*) echo "0, GPU-aaa, 00000000:3B:00.0, 50, 10, 100, 200, 60" ;;
  --query-compute-apps=*) echo "GPU-aaa, 4242, 100" ;;
esac"#,
        );

        let getter = NvidiaGetter::new(CommandExecutor::new(), tool, Duration::from_secs(5));
        let snapshot = getter.get().await.unwrap();
        assert_eq!(snapshot.gpus.len(), 1);
        assert_eq!(snapshot.gpus[0].gpu_util_percent, 50.0);
        assert_eq!(snapshot.processes.len(), 1);
        assert_eq!(snapshot.processes[0].pid, 4242);
    }

    #[tokio::test]
    async fn test_nvidia_getter_survives_process_query_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            &dir,
            "nvidia-smi",
            r#"case "$1" in
  --query-gpu=*) echo "0, GPU-aaa, 00000000:3B:00.0, 50, 10, 100, 200, 60" ;;
  *) exit 9 ;;
esac"#,
        );

        let getter = NvidiaGetter::new(CommandExecutor::new(), tool, Duration::from_secs(5));
        let snapshot = getter.get().await.unwrap();
        assert_eq!(snapshot.gpus.len(), 1);
        assert!(snapshot.processes.is_empty());
    }

    #[tokio::test]
    async fn test_nvidia_getter_reports_driver_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            &dir,
            "nvidia-smi",
            "echo 'NVIDIA-SMI has failed because it could not communicate with the NVIDIA driver.'",
        );

        let getter = NvidiaGetter::new(CommandExecutor::new(), tool, Duration::from_secs(5));
        assert!(matches!(getter.get().await, Err(CollectError::Other(_))));
    }

    #[tokio::test]
    async fn test_amd_getter() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            &dir,
            "rocm-smi",
            r#"echo '{"card0": {"GPU use (%)": "12", "GPU memory use (%)": "3"}}'"#,
        );

        let getter = AmdGetter::new(CommandExecutor::new(), tool, Duration::from_secs(5));
        let snapshot = getter.get().await.unwrap();
        assert_eq!(snapshot.gpus.len(), 1);
        assert_eq!(snapshot.gpus[0].gpu_util_percent, 12.0);
    }

    #[tokio::test]
    async fn test_amd_getter_ignores_stderr_warning() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            &dir,
            "rocm-smi",
            r#"echo '{"card0": {"GPU use (%)": "40", "GPU memory use (%)": "9"}}'
echo 'WARNING: Unable to read power for card0' 1>&2"#,
        );

        let getter = AmdGetter::new(CommandExecutor::new(), tool, Duration::from_secs(5));
        let snapshot = getter.get().await.unwrap();
        assert_eq!(snapshot.gpus.len(), 1);
        assert_eq!(snapshot.gpus[0].mem_util_percent, 9.0);
    }
}
