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
use crate::error::{CollectError, CommandError};
use crate::exec::CommandExecutor;
use crate::parsing::docker_inspect::parse_docker_inspect;
use crate::parsing::docker_stats::{parse_docker_stats, STATS_FORMAT};
use crate::parsing::{ContainerInspect, ContainerStats};

/// `docker stats --no-stream` for every running container.
pub struct DockerStatsGetter {
    executor: CommandExecutor,
    docker: String,
    timeout: Duration,
}

impl DockerStatsGetter {
    pub fn new(executor: CommandExecutor, docker: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor,
            docker: docker.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Getter<Vec<ContainerStats>> for DockerStatsGetter {
    async fn get(&self) -> Result<Vec<ContainerStats>, CollectError> {
        let argv = [
            self.docker.as_str(),
            "stats",
            "--no-stream",
            "--format",
            STATS_FORMAT,
        ];
        let output = self.executor.execute(&argv, self.timeout).await?;
        Ok(parse_docker_stats(&output))
    }
}

/// Lists running container ids, then inspects them in one call.
pub struct DockerInspectGetter {
    executor: CommandExecutor,
    docker: String,
    timeout: Duration,
}

impl DockerInspectGetter {
    pub fn new(executor: CommandExecutor, docker: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor,
            docker: docker.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Getter<Vec<ContainerInspect>> for DockerInspectGetter {
    async fn get(&self) -> Result<Vec<ContainerInspect>, CollectError> {
        let ps = [self.docker.as_str(), "ps", "-q", "--no-trunc"];
        let listing = self.executor.execute(&ps, self.timeout).await?;

        let ids: Vec<&str> = listing
            .lines()
            .map(str::trim)
            // stderr warnings share the output; ids are plain hex
            .filter(|l| !l.is_empty() && l.bytes().all(|b| b.is_ascii_hexdigit()))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut argv = vec![self.docker.as_str(), "inspect"];
        argv.extend(ids);
        match self.executor.execute(&argv, self.timeout).await {
            Ok(output) => Ok(parse_docker_inspect(&output)?),
            // A container exiting between `ps` and `inspect` makes docker exit 1
            // while still printing the ones it found.
            Err(CommandError::NonZeroExit { output, .. }) if output.contains('[') => {
                Ok(parse_docker_inspect(&output)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}
