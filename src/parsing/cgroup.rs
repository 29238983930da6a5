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

use once_cell::sync::Lazy;
use regex::Regex;

// Matches `/docker/<id>`, `docker-<id>.scope`, `cri-containerd-<id>.scope`
// and bare kubepods leaves such as `/kubepods/burstable/pod.../<id>`.
static CONTAINER_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[/-])([0-9a-f]{64})(?:\.scope)?$").expect("cgroup regex is valid")
});

/// Extract the container id from the content of `/proc/<pid>/cgroup`.
///
/// Returns `None` for host processes.
pub fn container_id_from_cgroup(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        // hierarchy-ID:controller-list:cgroup-path
        let path = line.splitn(3, ':').nth(2)?;
        CONTAINER_ID_RE
            .captures(path.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}
