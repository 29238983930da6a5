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
use crate::parsing::ps::{parse_ps, PS_ARGS};
use crate::parsing::ProcessRecord;

/// Full process table from `ps`.
pub struct PsGetter {
    executor: CommandExecutor,
    program: String,
    timeout: Duration,
}

impl PsGetter {
    pub fn new(executor: CommandExecutor, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor,
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Getter<Vec<ProcessRecord>> for PsGetter {
    async fn get(&self) -> Result<Vec<ProcessRecord>, CollectError> {
        let mut argv = vec![self.program.as_str()];
        argv.extend(PS_ARGS);
        let output = self.executor.execute(&argv, self.timeout).await?;
        Ok(parse_ps(&output))
    }
}
