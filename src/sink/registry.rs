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

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::MetricsSink;
use crate::error::SinkError;
use crate::metrics::Snapshot;

/// Last published exposition document, served by the HTTP endpoint.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    body: String,
    published_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// `false` until the first snapshot has been published.
    pub fn is_ready(&self) -> bool {
        self.published_at.is_some()
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub type SharedRegistry = Arc<RwLock<MetricsRegistry>>;

/// Swaps the rendered snapshot into a [`SharedRegistry`].
#[derive(Debug, Clone, Default)]
pub struct RegistrySink {
    registry: SharedRegistry,
}

impl RegistrySink {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }
}

#[async_trait]
impl MetricsSink for RegistrySink {
    fn name(&self) -> &str {
        "registry"
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        // Render outside the lock so scrapes are never blocked on formatting.
        let body = snapshot.render();
        let mut registry = self.registry.write().await;
        registry.body = body;
        registry.published_at = Some(Utc::now());
        registry.generation += 1;
        Ok(())
    }
}
