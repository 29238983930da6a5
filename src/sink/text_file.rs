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

// Text file sink for node-exporter style textfile collectors.
// The snapshot goes to a temp file in the target directory and is renamed
// over the target, so a scraper never reads a half-written file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;

use super::MetricsSink;
use crate::error::SinkError;
use crate::metrics::{MetricBuilder, Snapshot};

#[derive(Debug, Clone)]
pub struct TextFileSink {
    path: PathBuf,
}

impl TextFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(snapshot: &Snapshot) -> String {
        let mut builder = MetricBuilder::new();
        builder.comment(&format!(
            "job-exporter snapshot generated at {}",
            Utc::now().to_rfc3339()
        ));
        for family in snapshot.families() {
            builder.family(family);
        }
        let mut text = builder.build();
        text.push_str(snapshot.encoded());
        text
    }
}

/// Mode of the published file on unix.
pub const PUBLISHED_MODE: u32 = 0o644;

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), SinkError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    // Temp files start out 0600; textfile collectors often run as another user.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(PUBLISHED_MODE))?;
    }
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| SinkError::Persist {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

#[async_trait]
impl MetricsSink for TextFileSink {
    fn name(&self) -> &str {
        "text_file"
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let body = Self::render(snapshot);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, body.as_bytes()))
            .await
            .map_err(|e| SinkError::Io(io::Error::other(e)))??;
        tracing::debug!(path = %self.path.display(), "published metrics file");
        Ok(())
    }
}
