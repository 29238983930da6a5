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

//! Per-command latency histogram and failure counters.
//!
//! Slow diagnostic tools are a real failure mode on GPU nodes, so every
//! external invocation is timed here regardless of its outcome. The series
//! live in a private `prometheus` registry and are published as pre-encoded
//! exposition text next to the collector's own families.

use std::time::Duration;

use prometheus::core::Collector;
use prometheus::proto;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Upper bounds (seconds) of the latency buckets. `+Inf` is implicit.
pub const LATENCY_BUCKETS: [f64; 13] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

pub const LATENCY_METRIC: &str = "job_exporter_cmd_duration_seconds";
pub const FAILURE_METRIC: &str = "job_exporter_cmd_failures_total";

#[derive(Debug, Clone)]
pub struct CommandLatency {
    registry: Registry,
    duration: HistogramVec,
    failures: IntCounterVec,
}

impl CommandLatency {
    pub fn new() -> prometheus::Result<Self> {
        let duration = HistogramVec::new(
            HistogramOpts::new(
                LATENCY_METRIC,
                "Wall-clock duration of external command invocations",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["command"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new(
                FAILURE_METRIC,
                "External command invocations that timed out, exited non-zero or failed to spawn",
            ),
            &["command", "reason"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        Ok(Self {
            registry,
            duration,
            failures,
        })
    }

    pub fn observe(&self, command: &str, elapsed: Duration) {
        self.duration
            .with_label_values(&[command])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_failure(&self, command: &str, reason: &'static str) {
        self.failures.with_label_values(&[command, reason]).inc();
    }

    /// Number of observed invocations of `command`.
    pub fn count(&self, command: &str) -> u64 {
        find_series(&self.duration.collect(), &[("command", command)])
            .map_or(0, |m| m.get_histogram().get_sample_count())
    }

    pub fn failures(&self, command: &str, reason: &str) -> u64 {
        find_series(
            &self.failures.collect(),
            &[("command", command), ("reason", reason)],
        )
        .map_or(0, |m| m.get_counter().get_value() as u64)
    }

    /// Exposition text of every series observed so far.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode command latency metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for CommandLatency {
    fn default() -> Self {
        Self::new().expect("command latency metric definitions are valid")
    }
}

/// Series of `families` whose labels include every pair in `labels`.
fn find_series<'a>(
    families: &'a [proto::MetricFamily],
    labels: &[(&str, &str)],
) -> Option<&'a proto::Metric> {
    families
        .iter()
        .flat_map(|family| family.get_metric())
        .find(|metric| {
            labels.iter().all(|(name, value)| {
                metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.get_name() == *name && pair.get_value() == *value)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cumulative_buckets(latency: &CommandLatency, command: &str) -> Vec<(f64, u64)> {
        let families = latency.duration.collect();
        let series = find_series(&families, &[("command", command)]).unwrap();
        series
            .get_histogram()
            .get_bucket()
            .iter()
            .map(|b| (b.get_upper_bound(), b.get_cumulative_count()))
            .collect()
    }

    #[test]
    fn test_observe_buckets_are_cumulative() {
        let latency = CommandLatency::new().unwrap();
        latency.observe("nvidia-smi", Duration::from_millis(3));
        latency.observe("nvidia-smi", Duration::from_millis(700));
        latency.observe("nvidia-smi", Duration::from_secs(120));
        assert_eq!(latency.count("nvidia-smi"), 3);
        assert_eq!(latency.count("docker"), 0);

        let buckets = cumulative_buckets(&latency, "nvidia-smi");
        let at = |le: f64| buckets.iter().find(|(b, _)| *b == le).map(|(_, n)| *n);
        assert_eq!(at(0.005), Some(1));
        assert_eq!(at(0.5), Some(1));
        assert_eq!(at(1.0), Some(2));
        assert_eq!(at(60.0), Some(2));
    }

    #[test]
    fn test_failure_counter() {
        let latency = CommandLatency::new().unwrap();
        latency.record_failure("docker", "timeout");
        latency.record_failure("docker", "timeout");
        latency.record_failure("docker", "exit");
        assert_eq!(latency.failures("docker", "timeout"), 2);
        assert_eq!(latency.failures("docker", "exit"), 1);
        assert_eq!(latency.failures("ps", "spawn"), 0);
    }

    #[test]
    fn test_encode() {
        let latency = CommandLatency::new().unwrap();
        assert!(latency.encode().is_empty());

        latency.observe("ps", Duration::from_millis(20));
        latency.record_failure("ps", "exit");
        let text = latency.encode();
        assert!(text.contains(&format!("# TYPE {LATENCY_METRIC} histogram\n")));
        assert!(text.contains(&format!("{LATENCY_METRIC}_count{{command=\"ps\"}} 1\n")));
        assert!(text.contains(&format!("# TYPE {FAILURE_METRIC} counter\n")));
        assert!(text.contains(&format!(
            "{FAILURE_METRIC}{{command=\"ps\",reason=\"exit\"}} 1\n"
        )));
    }
}
