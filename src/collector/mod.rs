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

//! The collection loop: `Idle -> Collecting -> Publishing -> Idle`.
//!
//! Every cycle reads all sources concurrently, builds metric families from
//! whatever came back, and pushes the result into every sink. A missing
//! source omits its families; a failing family builder omits only itself.

pub mod exporter;
pub mod gpu;
pub mod merge;
pub mod ownership;
pub mod process;
pub mod self_metrics;
pub mod task;

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::common::config::{AppConfig, GpuType};
use crate::exec::CommandExecutor;
use crate::metrics::{MetricFamily, Snapshot};
use crate::parsing::{GpuSnapshot, ProcessRecord};
use crate::sink::MetricsSink;
use crate::sources::{
    Sources, DOCKER_INSPECT_SOURCE, DOCKER_STATS_SOURCE, GPU_SOURCE, PS_SOURCE,
};

pub use exporter::FamilyExporter;
pub use gpu::GpuMetricExporter;
pub use merge::{merge_containers, ContainerSnapshot};
pub use ownership::{resolve_pid_owners, GpuOwnershipExporter, PidOwners};
pub use process::ProcessMetricExporter;
pub use self_metrics::{CollectorStats, SourceReport};
pub use task::{TaskGpuMetricExporter, TaskMetricExporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Collecting,
    Publishing,
}

pub struct Collector {
    sources: Sources,
    executor: CommandExecutor,
    sinks: Vec<Arc<dyn MetricsSink>>,
    interval: Duration,
    gpu_type: GpuType,
    proc_root: PathBuf,
    stats: CollectorStats,
    state: watch::Sender<LoopState>,
}

impl Collector {
    pub fn new(sources: Sources, executor: CommandExecutor) -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            sources,
            executor,
            sinks: Vec::new(),
            interval: Duration::from_secs(AppConfig::DEFAULT_INTERVAL_SECS),
            gpu_type: GpuType::Nvidia,
            proc_root: PathBuf::from(AppConfig::DEFAULT_PROC_ROOT),
            stats: CollectorStats::new(),
            state,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_gpu_type(mut self, gpu_type: GpuType) -> Self {
        self.gpu_type = gpu_type;
        self
    }

    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Observe loop state transitions.
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    /// Run cycles every `interval` until `shutdown` resolves.
    ///
    /// A cycle slower than the interval delays the next one; missed ticks
    /// are skipped rather than queued, so cycles never overlap. Shutdown
    /// abandons a cycle in progress; sinks only ever see whole snapshots.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(interval = ?self.interval, sinks = self.sinks.len(), "collection loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.collect_once() => {}
                    }
                }
            }
        }
        self.state.send_replace(LoopState::Idle);
        tracing::info!("collection loop stopped");
    }

    /// One full cycle. Returns the snapshot that was published.
    pub async fn collect_once(&self) -> Snapshot {
        let started = Instant::now();
        let cycle = self.stats.record_cycle();
        self.state.send_replace(LoopState::Collecting);

        let gpu_lookup = async {
            match &self.sources.gpu {
                Some(singleton) => Some(singleton.lookup().await),
                None => None,
            }
        };
        let (gpu, container_stats, container_inspect, processes) = tokio::join!(
            gpu_lookup,
            self.sources.container_stats.lookup(),
            self.sources.container_inspect.lookup(),
            self.sources.processes.lookup(),
        );

        self.state.send_replace(LoopState::Publishing);

        let mut reports = Vec::with_capacity(4);
        if let Some(lookup) = &gpu {
            reports.push(SourceReport::from_lookup(GPU_SOURCE, lookup));
        }
        reports.push(SourceReport::from_lookup(DOCKER_STATS_SOURCE, &container_stats));
        reports.push(SourceReport::from_lookup(DOCKER_INSPECT_SOURCE, &container_inspect));
        reports.push(SourceReport::from_lookup(PS_SOURCE, &processes));

        let gpu = gpu.and_then(|lookup| lookup.into_value());
        let stats = container_stats.into_value();
        let inspect = container_inspect.into_value();
        let processes = processes.into_value();

        let containers = stats
            .as_deref()
            .map(|rows| merge_containers(rows, inspect.as_deref()));
        let owners = match &gpu {
            Some(snapshot) => resolve_pid_owners(&self.proc_root, snapshot).await,
            None => PidOwners::new(),
        };

        let mut families = self.export_all(
            gpu.as_ref(),
            &owners,
            containers.as_deref(),
            processes.as_deref(),
        );
        families.extend(self.stats.families(&reports, started.elapsed()));
        let snapshot = Snapshot::new(families).with_encoded(self.executor.latency().encode());

        for sink in &self.sinks {
            if let Err(e) = sink.publish(&snapshot).await {
                tracing::error!(sink = sink.name(), error = %e, "failed to publish metrics");
            }
        }

        tracing::debug!(
            cycle,
            families = snapshot.families().len(),
            elapsed = ?started.elapsed(),
            "collection cycle finished"
        );
        self.state.send_replace(LoopState::Idle);
        snapshot
    }

    fn export_all(
        &self,
        gpu: Option<&GpuSnapshot>,
        owners: &PidOwners,
        containers: Option<&[ContainerSnapshot]>,
        processes: Option<&[ProcessRecord]>,
    ) -> Vec<MetricFamily> {
        let mut exporters: Vec<Box<dyn FamilyExporter + '_>> = Vec::new();
        if let Some(snapshot) = gpu {
            exporters.push(Box::new(GpuMetricExporter::new(snapshot, self.gpu_type)));
            exporters.push(Box::new(GpuOwnershipExporter::new(
                snapshot, owners, containers,
            )));
        }
        if let Some(containers) = containers {
            exporters.push(Box::new(TaskMetricExporter::new(containers)));
            if let Some(snapshot) = gpu {
                exporters.push(Box::new(TaskGpuMetricExporter::new(containers, snapshot)));
            }
        }
        if let Some(processes) = processes {
            exporters.push(Box::new(ProcessMetricExporter::new(processes)));
        }

        exporters
            .iter()
            .flat_map(|exporter| self.export_isolated(exporter.as_ref()))
            .collect()
    }

    /// Build one exporter's families; errors and panics drop only that group.
    fn export_isolated(&self, exporter: &dyn FamilyExporter) -> Vec<MetricFamily> {
        let family = exporter.family();
        match catch_unwind(AssertUnwindSafe(|| exporter.export())) {
            Ok(Ok(families)) => families,
            Ok(Err(e)) => {
                tracing::warn!(family, error = %e, "metric family omitted this cycle");
                self.stats.record_family_error(family);
                Vec::new()
            }
            Err(_) => {
                tracing::error!(family, "metric family builder panicked");
                self.stats.record_family_error(family);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Singleton;
    use crate::error::CollectError;
    use crate::parsing::{ContainerInspect, ContainerStats};
    use crate::error::SinkError;
    use crate::sink::RegistrySink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_containers() -> Singleton<Vec<ContainerStats>> {
        Singleton::with_defaults(DOCKER_STATS_SOURCE, || async {
            Ok::<Vec<ContainerStats>, CollectError>(Vec::new())
        })
    }

    fn no_inspect() -> Singleton<Vec<ContainerInspect>> {
        Singleton::with_defaults(DOCKER_INSPECT_SOURCE, || async {
            Ok::<Vec<ContainerInspect>, CollectError>(Vec::new())
        })
    }

    fn failing_ps() -> Singleton<Vec<ProcessRecord>> {
        Singleton::new(
            PS_SOURCE,
            || async { Err::<Vec<ProcessRecord>, CollectError>(CollectError::Other("ps is broken".into())) },
            Duration::from_millis(200),
            Duration::ZERO,
        )
    }

    fn collector() -> Collector {
        let sources = Sources::new(None, no_containers(), no_inspect(), failing_ps());
        Collector::new(sources, CommandExecutor::new())
    }

    #[tokio::test]
    async fn test_absent_source_omits_families() {
        let snapshot = collector().collect_once().await;

        assert!(snapshot.family("process_blocked_count").is_none());
        let up = snapshot.family("job_exporter_source_up").unwrap();
        let ps_up = up
            .samples
            .iter()
            .find(|m| m.label("source") == Some(PS_SOURCE))
            .map(|m| m.as_f64());
        assert_eq!(ps_up, Some(0.0));
        assert!(!up.samples.iter().any(|m| m.label("source") == Some(GPU_SOURCE)));
    }

    #[tokio::test]
    async fn test_state_returns_to_idle_and_publishes() {
        let sink = RegistrySink::default();
        let registry = sink.registry();
        let collector = collector().with_sink(Arc::new(sink));
        let state = collector.state();

        collector.collect_once().await;

        assert_eq!(*state.borrow(), LoopState::Idle);
        assert_eq!(collector.stats().cycles(), 1);
        let snapshot = registry.read().await;
        assert!(snapshot.is_ready());
        assert!(snapshot.body().contains("job_exporter_collection_cycles_total 1\n"));
    }

    #[test]
    fn test_failing_exporter_is_isolated() {
        struct Broken;
        impl FamilyExporter for Broken {
            fn family(&self) -> &'static str {
                "broken"
            }
            fn export(&self) -> Result<Vec<MetricFamily>, CollectError> {
                Err(CollectError::Merge("missing key".into()))
            }
        }
        struct Panicking;
        impl FamilyExporter for Panicking {
            fn family(&self) -> &'static str {
                "panicking"
            }
            fn export(&self) -> Result<Vec<MetricFamily>, CollectError> {
                panic!("bug in exporter")
            }
        }

        let collector = collector();
        assert!(collector.export_isolated(&Broken).is_empty());
        assert!(collector.export_isolated(&Panicking).is_empty());
        assert_eq!(collector.stats().family_errors("broken"), 1);
        assert_eq!(collector.stats().family_errors("panicking"), 1);
    }

    #[tokio::test]
    async fn test_gpu_source_feeds_gpu_families() {
        let gpu = Singleton::with_defaults(GPU_SOURCE, || async {
            Ok::<GpuSnapshot, CollectError>(GpuSnapshot {
                gpus: crate::parsing::nvidia_smi::parse_gpu_query(
                    "0, GPU-a, 00000000:3B:00.0, 55, 5, 10, 20, 40\n",
                ),
                processes: vec![],
            })
        });
        let sources = Sources::new(Some(gpu), no_containers(), no_inspect(), failing_ps());
        let snapshot = Collector::new(sources, CommandExecutor::new())
            .collect_once()
            .await;

        let util = snapshot.family("nvidiasmi_utilization_gpu").unwrap();
        assert_eq!(util.samples[0].as_f64(), 55.0);
    }

    #[tokio::test]
    async fn test_snapshot_carries_command_latency() {
        let executor = CommandExecutor::new();
        executor
            .latency()
            .observe("nvidia-smi", Duration::from_millis(30));
        let sink = RegistrySink::default();
        let registry = sink.registry();
        let sources = Sources::new(None, no_containers(), no_inspect(), failing_ps());
        let collector = Collector::new(sources, executor).with_sink(Arc::new(sink));

        let snapshot = collector.collect_once().await;

        let line = "job_exporter_cmd_duration_seconds_count{command=\"nvidia-smi\"} 1\n";
        assert!(snapshot.encoded().contains(line));
        assert!(registry.read().await.body().contains(line));
    }

    /// Holds the first publish for a long time and tracks concurrency.
    #[derive(Default)]
    struct StallingSink {
        published: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl MetricsSink for StallingSink {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn publish(&self, _snapshot: &Snapshot) -> Result<(), SinkError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.published.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_cycle_skips_missed_ticks() {
        let sink = Arc::new(StallingSink::default());
        let collector = collector()
            .with_interval(Duration::from_millis(50))
            .with_sink(sink.clone());

        collector
            .run(tokio::time::sleep(Duration::from_millis(700)))
            .await;

        // The first cycle spans ten ticks. Replaying them would start a
        // burst of back-to-back cycles; skipping leaves only the ticks
        // after 500ms.
        let cycles = collector.stats().cycles();
        assert!(cycles >= 2, "loop kept ticking after the slow cycle: {cycles}");
        assert!(cycles <= 7, "missed ticks were replayed: {cycles} cycles");
        assert_eq!(sink.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
