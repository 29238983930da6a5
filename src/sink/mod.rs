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

//! Destinations for a cycle's metric snapshot.
//!
//! Every sink publishes atomically: readers see either the previous
//! snapshot or the new one, never a mix.

pub mod registry;
pub mod text_file;

pub use registry::{MetricsRegistry, RegistrySink, SharedRegistry};
pub use text_file::TextFileSink;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::metrics::Snapshot;

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), SinkError>;
}
