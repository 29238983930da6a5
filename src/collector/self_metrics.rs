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

//! Metrics the collector reports about itself.
//!
//! Operators need to know when they are looking at lagging data, so every
//! source exports whether it produced anything, whether that was stale,
//! and how old it is.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::cache::Lookup;
use crate::metrics::MetricFamily;

/// Outcome of one source's lookup in the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: &'static str,
    pub up: bool,
    pub stale: bool,
    pub age: Option<Duration>,
}

impl SourceReport {
    pub fn from_lookup<T>(source: &'static str, lookup: &Lookup<T>) -> Self {
        Self {
            source,
            up: !lookup.is_absent(),
            stale: lookup.is_stale(),
            age: lookup.age(),
        }
    }
}

/// Counters that persist across cycles.
#[derive(Debug, Default)]
pub struct CollectorStats {
    cycles: AtomicU64,
    family_errors: Mutex<BTreeMap<&'static str, u64>>,
}

impl CollectorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn record_family_error(&self, family: &'static str) {
        let mut errors = self
            .family_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *errors.entry(family).or_insert(0) += 1;
    }

    pub fn family_errors(&self, family: &str) -> u64 {
        self.family_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(family)
            .copied()
            .unwrap_or(0)
    }

    /// Self-metric families for the cycle that took `duration`.
    pub fn families(&self, reports: &[SourceReport], duration: Duration) -> Vec<MetricFamily> {
        let mut up = MetricFamily::gauge(
            "job_exporter_source_up",
            "Whether the source produced usable data this cycle",
        );
        let mut stale = MetricFamily::gauge(
            "job_exporter_source_stale",
            "Whether the source served cached data instead of a fresh result",
        );
        let mut age = MetricFamily::gauge(
            "job_exporter_source_data_age_seconds",
            "Age of the data served by the source",
        );
        for report in reports {
            let labels = [("source", report.source)];
            up.add(labels, u64::from(report.up));
            stale.add(labels, u64::from(report.stale));
            if let Some(data_age) = report.age {
                age.add(labels, data_age.as_secs_f64());
            }
        }

        let no_labels: [(&str, &str); 0] = [];
        let mut cycle_duration = MetricFamily::gauge(
            "job_exporter_collection_duration_seconds",
            "Wall-clock duration of the last collection cycle",
        );
        cycle_duration.add(no_labels, duration.as_secs_f64());

        let mut cycles = MetricFamily::counter(
            "job_exporter_collection_cycles_total",
            "Collection cycles started",
        );
        cycles.add(no_labels, self.cycles());

        let mut errors = MetricFamily::counter(
            "job_exporter_family_errors_total",
            "Metric family builds that failed and were omitted",
        );
        {
            let counts = self
                .family_errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for (family, n) in counts.iter() {
                errors.add([("family", *family)], *n);
            }
        }

        vec![up, stale, age, cycle_duration, cycles, errors]
    }
}
