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

use serde::Deserialize;

use super::common::leading_json;
use super::types::ContainerInspect;
use crate::error::ParseError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInspect {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: Option<RawConfig>,
    #[serde(default)]
    state: Option<RawState>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawConfig {
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
    #[serde(default)]
    env: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawState {
    #[serde(default)]
    pid: i64,
}

/// Parse the JSON array printed by `docker inspect <id>...`.
///
/// Warnings docker writes around the array are ignored.
pub fn parse_docker_inspect(output: &str) -> Result<Vec<ContainerInspect>, ParseError> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<RawInspect> = leading_json(output, '[')?.ok_or_else(|| {
        ParseError::Format("docker inspect output holds no JSON array".to_string())
    })?;
    Ok(raw.into_iter().map(RawInspect::into_inspect).collect())
}

/// Split `KEY=VALUE` entries on the first `=`; entries without one map to "".
pub fn parse_env(entries: &[String]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

impl RawInspect {
    fn into_inspect(self) -> ContainerInspect {
        let config = self.config.unwrap_or_default();
        let pid = self
            .state
            .map(|s| s.pid)
            .filter(|pid| *pid > 0)
            .and_then(|pid| u32::try_from(pid).ok());

        ContainerInspect {
            id: self.id,
            name: self.name.trim_start_matches('/').to_string(),
            labels: config.labels.unwrap_or_default(),
            env: parse_env(&config.env.unwrap_or_default()),
            pid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "Id": "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90",
            "Name": "/alice-job-0",
            "State": { "Status": "running", "Pid": 4242 },
            "Config": {
                "Labels": { "GPU_ID": "0,1", "PAI_JOB_NAME": "alice~train" },
                "Env": ["PATH=/usr/bin", "PAI_TASK_INDEX=3", "OPTS=a=b=c", "FLAG"]
            }
        },
        {
            "Id": "0f9e8d7c6b5a49382716f5e4d3c2b1a00f9e8d7c6b5a49382716f5e4d3c2b1a0",
            "Name": "/exited",
            "State": { "Status": "exited", "Pid": 0 },
            "Config": { "Labels": null, "Env": null }
        }
    ]"#;

    #[test]
    fn test_parse_inspect() {
        let containers = parse_docker_inspect(SAMPLE).unwrap();
        assert_eq!(containers.len(), 2);

        let alice = &containers[0];
        assert!(alice.id.starts_with("a1b2c3d4e5f6"));
        assert_eq!(alice.name, "alice-job-0");
        assert_eq!(alice.pid, Some(4242));
        assert_eq!(alice.labels.get("GPU_ID").map(String::as_str), Some("0,1"));
        assert_eq!(alice.env.get("PAI_TASK_INDEX").map(String::as_str), Some("3"));
        assert_eq!(alice.env.get("OPTS").map(String::as_str), Some("a=b=c"));
        assert_eq!(alice.env.get("FLAG").map(String::as_str), Some(""));

        let exited = &containers[1];
        assert_eq!(exited.pid, None);
        assert!(exited.labels.is_empty());
        assert!(exited.env.is_empty());
    }

    #[test]
    fn test_empty_output_is_empty_list() {
        assert!(parse_docker_inspect("").unwrap().is_empty());
        assert!(parse_docker_inspect("[]").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_docker_inspect("Error: No such object: abc").unwrap_err();
        assert!(matches!(err, ParseError::Format(_)));
        let err = parse_docker_inspect("[{\"Id\": ").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_trailing_warning_is_ignored() {
        let output = format!(
            "{SAMPLE}\nWARNING: Error loading config file: /root/.docker/config.json: permission denied\n"
        );
        let containers = parse_docker_inspect(&output).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "alice-job-0");
    }
}
