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

use crate::error::CollectError;
use crate::metrics::MetricFamily;

/// Turns one cycle's snapshots into a group of metric families.
pub trait FamilyExporter {
    /// Stable name used in logs and in `job_exporter_family_errors_total`.
    fn family(&self) -> &'static str;

    fn export(&self) -> Result<Vec<MetricFamily>, CollectError>;
}
