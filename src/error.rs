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

//! Unified error types for the job-exporter library.
//!
//! Failures are typed so that callers can pattern-match recovery behavior:
//! a [`CommandError`] comes out of the command executor, a [`ParseError`]
//! out of a format adapter, and both are folded into [`CollectError`] by the
//! getters and metric family builders. None of these ever escapes a
//! collection cycle; they are logged and the affected metrics are omitted.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single external command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command did not finish in time and was killed.
    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The command ran but exited unsuccessfully.
    ///
    /// `code` is `None` when the process was terminated by a signal.
    #[error("command '{command}' exited with code {code:?}: {output}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The executable could not be found or started.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Short, stable reason used as a metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            CommandError::Timeout { .. } => "timeout",
            CommandError::NonZeroExit { .. } => "exit",
            CommandError::Spawn { .. } => "spawn",
        }
    }
}

/// A format adapter could not make sense of tool output.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected format: {0}")]
    Format(String),
}

/// What a getter or a metric family builder may fail with.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A join between two datasets could not be completed.
    #[error("merge failed: {0}")]
    Merge(String),

    #[error("{0}")]
    Other(String),
}

/// Failure to publish a snapshot into a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The main error type for job-exporter operations outside a collection cycle.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP listener could not be bound or the server failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for job-exporter operations.
pub type Result<T> = std::result::Result<T, Error>;
