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

// Standardized command execution for every external diagnostic tool.
//
// Goals:
// - Argument vectors only, never a shell string
// - Hard wall-clock timeout; a timed-out child is killed and reaped
// - stdout and stderr combined into one string (UTF-8 lossy)
// - Every call timed into the per-command latency histogram

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::latency::CommandLatency;
use crate::error::CommandError;

/// Longest slice of captured output carried into log lines.
const LOG_OUTPUT_LIMIT: usize = 512;

/// Runs external commands and records how long they take.
///
/// Cloning is cheap; clones share one latency histogram.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    latency: Arc<CommandLatency>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Arc<CommandLatency>) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> &Arc<CommandLatency> {
        &self.latency
    }

    /// Execute `argv` and return its combined stdout and stderr.
    ///
    /// - `argv[0]` is the program, the rest are passed verbatim as arguments
    /// - Exceeding `timeout` kills the child and returns [`CommandError::Timeout`]
    /// - A non-zero exit returns [`CommandError::NonZeroExit`] with the captured output
    /// - A missing or non-executable program returns [`CommandError::Spawn`]
    pub async fn execute<S: AsRef<str>>(
        &self,
        argv: &[S],
        timeout: Duration,
    ) -> Result<String, CommandError> {
        let argv: Vec<&str> = argv.iter().map(AsRef::as_ref).collect();
        let name = argv.first().map(|p| command_name(p)).unwrap_or_default();

        let started = Instant::now();
        let result = run_with_timeout(&argv, timeout).await;
        let elapsed = started.elapsed();
        self.latency.observe(&name, elapsed);

        match &result {
            Ok(_) => {
                tracing::trace!(command = %name, ?elapsed, "command finished");
            }
            Err(err) => {
                self.latency.record_failure(&name, err.reason());
                match err {
                    CommandError::Timeout { command, timeout } => {
                        tracing::warn!(%command, ?timeout, "command timed out and was killed");
                    }
                    CommandError::NonZeroExit {
                        command,
                        code,
                        output,
                    } => {
                        tracing::warn!(
                            %command,
                            ?code,
                            output = %truncate(output, LOG_OUTPUT_LIMIT),
                            "command exited unsuccessfully"
                        );
                    }
                    CommandError::Spawn { command, source } => {
                        tracing::warn!(%command, error = %source, "failed to spawn command");
                    }
                }
            }
        }

        result
    }
}

async fn run_with_timeout(argv: &[&str], timeout: Duration) -> Result<String, CommandError> {
    let command = argv.join(" ");
    let Some((program, args)) = argv.split_first() else {
        return Err(CommandError::Spawn {
            command,
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"),
        });
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Pipes are drained while waiting so a chatty child cannot block on a full pipe.
    let finished = async {
        let (out, err, status) = tokio::join!(read_pipe(stdout), read_pipe(stderr), child.wait());
        (out, err, status)
    };
    let outcome = tokio::time::timeout(timeout, finished).await;

    let (out, err, status) = match outcome {
        Ok(done) => done,
        Err(_) => {
            if let Err(e) = child.kill().await {
                tracing::debug!(%command, error = %e, "kill after timeout failed");
            }
            return Err(CommandError::Timeout { command, timeout });
        }
    };

    let status = status.map_err(|source| CommandError::Spawn {
        command: command.clone(),
        source,
    })?;

    let mut output = String::from_utf8_lossy(&out.unwrap_or_default()).into_owned();
    output.push_str(&String::from_utf8_lossy(&err.unwrap_or_default()));

    if status.success() {
        Ok(output)
    } else {
        Err(CommandError::NonZeroExit {
            command,
            code: status.code(),
            output,
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// File name of the program, used as the histogram key.
fn command_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

fn truncate(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
