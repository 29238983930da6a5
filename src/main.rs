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

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use job_exporter::api;
use job_exporter::cli::Cli;
use job_exporter::collector::Collector;
use job_exporter::common::config::CollectorConfig;
use job_exporter::error::Result;
use job_exporter::exec::CommandExecutor;
use job_exporter::sink::{RegistrySink, TextFileSink};
use job_exporter::sources::Sources;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "job_exporter=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config();
    if let Err(e) = config.validate() {
        tracing::error!("{e}");
        std::process::exit(2);
    }
    if let Err(e) = run(config).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: CollectorConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            return;
        }
        tracing::info!("received Ctrl+C, shutting down");
        ctrl_c_tx.send_replace(true);
    });
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::spawn(async move {
            sigterm.recv().await;
            tracing::info!("received SIGTERM, shutting down");
            shutdown_tx.send_replace(true);
        });
    }
    let shutdown = move || {
        let mut rx = shutdown_rx.clone();
        async move {
            let _ = rx.wait_for(|stop| *stop).await;
        }
    };

    let executor = CommandExecutor::new();
    let sources = Sources::from_config(&config, &executor);
    let registry_sink = RegistrySink::default();
    let mut collector = Collector::new(sources, executor)
        .with_interval(config.interval)
        .with_gpu_type(config.gpu_type)
        .with_proc_root(config.proc_root.clone());

    let server = if config.port != 0 {
        let listener = api::bind(config.port).await?;
        collector = collector.with_sink(Arc::new(registry_sink.clone()));
        let registry = registry_sink.registry();
        let stop = shutdown();
        Some(tokio::spawn(api::serve(listener, registry, stop)))
    } else {
        None
    };

    if let Some(path) = &config.output {
        tracing::info!(path = %path.display(), "publishing metrics to file");
        collector = collector.with_sink(Arc::new(TextFileSink::new(path)));
    }

    collector.run(shutdown()).await;

    if let Some(server) = server {
        match server.await {
            Ok(result) => result?,
            Err(e) => tracing::error!("HTTP server task failed: {e}"),
        }
    }
    Ok(())
}
