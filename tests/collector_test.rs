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

//! End-to-end collection cycles with in-process sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use job_exporter::cache::Singleton;
use job_exporter::collector::{Collector, LoopState};
use job_exporter::common::config::GpuType;
use job_exporter::error::CollectError;
use job_exporter::exec::CommandExecutor;
use job_exporter::parsing::docker_inspect::parse_docker_inspect;
use job_exporter::parsing::docker_stats::parse_docker_stats;
use job_exporter::parsing::nvidia_smi::{parse_compute_apps, parse_gpu_query};
use job_exporter::parsing::ps::parse_ps;
use job_exporter::parsing::{ContainerInspect, ContainerStats, GpuSnapshot, ProcessRecord};
use job_exporter::sink::{RegistrySink, TextFileSink};
use job_exporter::sources::Sources;

const ALICE_ID: &str = "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2";
const ZOMBIE_ID: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

const GPU_QUERY: &str = "\
0, GPU-a, 00000000:3B:00.0, 55, 5, 1024, 16384, 40
1, GPU-b, 00000000:AF:00.0, 90, 70, 8192, 16384, 65
";

const COMPUTE_APPS: &str = "\
GPU-a, 4242, 100
GPU-b, 5151, 50
";

const DOCKER_STATS: &str = "\
CONTAINER ID,NAME,CPU %,MEM USAGE / LIMIT,NET I/O,BLOCK I/O,MEM %
a1b2c3d4e5f6,alice-job-0,24.45%,380.4MiB / 31.26GiB,1.2kB / 648B,0B / 4.1MB,1.19%
0f9e8d7c6b5a,bob-job-1,0.00%,2GiB / 8GiB,3MB / 1.5kB,12kB / 0B,25.00%
";

const DOCKER_INSPECT: &str = r#"[
  {
    "Id": "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2",
    "Name": "/alice-job-0",
    "Config": {
      "Labels": {"GPU_ID": "1"},
      "Env": ["PAI_JOB_NAME=alice~train", "PAI_USER_NAME=alice"]
    },
    "State": {"Pid": 4100}
  }
]"#;

const PS_OUTPUT: &str = "\
S        1 11804 /sbin/init splash
D     1742  2048 [nvidia-modeset/kthread]
Z     1800     0 [python3] <defunct>
";

fn gpu_source() -> Singleton<GpuSnapshot> {
    Singleton::with_defaults("gpu", || async {
        Ok::<GpuSnapshot, CollectError>(GpuSnapshot {
            gpus: parse_gpu_query(GPU_QUERY),
            processes: parse_compute_apps(COMPUTE_APPS),
        })
    })
}

fn stats_source() -> Singleton<Vec<ContainerStats>> {
    Singleton::with_defaults("docker_stats", || async {
        Ok::<Vec<ContainerStats>, CollectError>(parse_docker_stats(DOCKER_STATS))
    })
}

fn inspect_source() -> Singleton<Vec<ContainerInspect>> {
    Singleton::with_defaults("docker_inspect", || async {
        parse_docker_inspect(DOCKER_INSPECT).map_err(CollectError::from)
    })
}

/// Succeeds once, then hangs far past the lookup timeout.
fn slow_after_first_ps_source() -> Singleton<Vec<ProcessRecord>> {
    let calls = Arc::new(AtomicUsize::new(0));
    Singleton::new(
        "ps",
        move || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) > 0 {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok::<Vec<ProcessRecord>, CollectError>(parse_ps(PS_OUTPUT))
            }
        },
        Duration::from_millis(200),
        Duration::from_secs(60),
    )
}

fn fake_proc_root(dir: &tempfile::TempDir) {
    let zombie = dir.path().join("4242");
    std::fs::create_dir_all(&zombie).unwrap();
    std::fs::write(
        zombie.join("cgroup"),
        format!("0::/system.slice/docker-{ZOMBIE_ID}.scope\n"),
    )
    .unwrap();

    let host = dir.path().join("5151");
    std::fs::create_dir_all(&host).unwrap();
    std::fs::write(host.join("cgroup"), "0::/user.slice/user-1000.slice/session-3.scope\n")
        .unwrap();
}

#[tokio::test]
async fn test_full_cycle_publishes_to_every_sink() {
    let proc_root = tempfile::tempdir().unwrap();
    fake_proc_root(&proc_root);
    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("job_exporter.prom");

    let registry_sink = RegistrySink::default();
    let registry = registry_sink.registry();
    let sources = Sources::new(
        Some(gpu_source()),
        stats_source(),
        inspect_source(),
        slow_after_first_ps_source(),
    );
    let collector = Collector::new(sources, CommandExecutor::new())
        .with_gpu_type(GpuType::Nvidia)
        .with_proc_root(proc_root.path())
        .with_sink(Arc::new(registry_sink))
        .with_sink(Arc::new(TextFileSink::new(&output)));

    collector.collect_once().await;

    let body = registry.read().await.body().to_string();
    let file = std::fs::read_to_string(&output).unwrap();
    assert!(file.ends_with(&body), "file and registry hold the same snapshot");

    assert!(body.contains("nvidiasmi_utilization_gpu{minor_number=\"1\",uuid=\"GPU-b\"} 90\n"));
    assert!(body.contains(&format!(
        "task_cpu_percent{{container_id=\"{ALICE_ID}\",container_name=\"alice-job-0\",job_name=\"alice~train\",username=\"alice\"}} 24.45\n"
    )));
    assert!(body.contains("task_gpu_percent{"));
    assert!(body.contains(&format!(
        "gpu_used_by_zombie_container{{container_id=\"{ZOMBIE_ID}\",minor_number=\"0\"}} 1\n"
    )));
    assert!(body.contains("gpu_used_by_external_process{minor_number=\"1\",pid=\"5151\"} 1\n"));
    assert!(body.contains("process_blocked_count 1\n"));
    assert!(body.contains("process_zombie_count 1\n"));
    assert!(body.contains("job_exporter_source_up{source=\"gpu\"} 1\n"));
    assert!(body.contains("job_exporter_source_stale{source=\"ps\"} 0\n"));
}

#[tokio::test]
async fn test_hung_source_serves_stale_data() {
    let registry_sink = RegistrySink::default();
    let registry = registry_sink.registry();
    let sources = Sources::new(
        None,
        stats_source(),
        inspect_source(),
        slow_after_first_ps_source(),
    );
    let collector =
        Collector::new(sources, CommandExecutor::new()).with_sink(Arc::new(registry_sink));

    collector.collect_once().await;
    let snapshot = collector.collect_once().await;

    let stale = snapshot.family("job_exporter_source_stale").unwrap();
    let ps_stale = stale
        .samples
        .iter()
        .find(|m| m.label("source") == Some("ps"))
        .map(|m| m.as_f64());
    assert_eq!(ps_stale, Some(1.0));

    let body = registry.read().await.body().to_string();
    assert!(body.contains("process_blocked_count 1\n"));
    assert!(!body.contains("nvidiasmi_"));
    assert_eq!(registry.read().await.generation(), 2);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let sources = Sources::new(None, stats_source(), inspect_source(), slow_after_first_ps_source());
    let collector = Collector::new(sources, CommandExecutor::new())
        .with_interval(Duration::from_millis(50));
    let state = collector.state();

    tokio::time::timeout(
        Duration::from_secs(5),
        collector.run(tokio::time::sleep(Duration::from_millis(400))),
    )
    .await
    .expect("run returns once shutdown resolves");

    assert!(collector.stats().cycles() >= 1);
    assert_eq!(*state.borrow(), LoopState::Idle);
}
