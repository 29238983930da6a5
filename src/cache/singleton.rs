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

//! Staleness-bounded, single-flight cache around an expensive getter.
//!
//! A [`Singleton`] wraps a [`Getter`] that may block for a long time (it
//! usually shells out to a diagnostic tool). Every [`Singleton::lookup`]:
//!
//! 1. starts a background refresh unless one is already in flight,
//! 2. waits at most `get_timeout` for that refresh,
//! 3. falls back to the last good value while it is younger than
//!    `old_data_timeout`,
//! 4. and otherwise reports [`Lookup::Absent`].
//!
//! The refresh runs as its own tokio task, so it keeps going after every
//! caller gave up waiting and the next caller benefits from its result.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::watch;

use crate::common::config::{DEFAULT_GET_TIMEOUT, DEFAULT_OLD_DATA_TIMEOUT};
use crate::error::CollectError;

/// Produces a fresh value, typically by running an external command.
#[async_trait]
pub trait Getter<T>: Send + Sync + 'static {
    async fn get(&self) -> Result<T, CollectError>;
}

#[async_trait]
impl<T, F, Fut> Getter<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, CollectError>> + Send + 'static,
{
    async fn get(&self) -> Result<T, CollectError> {
        (self)().await
    }
}

/// Last good value and the instant it was produced.
#[derive(Debug, Clone)]
pub struct CachedResult<T> {
    pub value: T,
    pub produced_at: Instant,
}

/// Outcome of a [`Singleton::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Produced by a refresh that completed within `get_timeout`.
    Fresh(T),
    /// Previously cached value, younger than `old_data_timeout`.
    Stale { value: T, age: Duration },
    /// No usable value: the metric is temporarily unavailable.
    Absent,
}

impl<T> Lookup<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Lookup::Fresh(value) | Lookup::Stale { value, .. } => Some(value),
            Lookup::Absent => None,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Lookup::Fresh(value) | Lookup::Stale { value, .. } => Some(value),
            Lookup::Absent => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Lookup::Stale { .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }

    /// Age of the returned value; zero for fresh data.
    pub fn age(&self) -> Option<Duration> {
        match self {
            Lookup::Fresh(_) => Some(Duration::ZERO),
            Lookup::Stale { age, .. } => Some(*age),
            Lookup::Absent => None,
        }
    }
}

/// Completion signal of one refresh: `None` while running, then whether it
/// produced a value.
type RefreshDone = watch::Receiver<Option<bool>>;

struct State<T> {
    cached: Option<CachedResult<T>>,
    in_flight: Option<RefreshDone>,
}

pub struct Singleton<T> {
    name: String,
    getter: Arc<dyn Getter<T>>,
    get_timeout: Duration,
    old_data_timeout: Duration,
    state: Arc<Mutex<State<T>>>,
}

impl<T> Singleton<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        getter: impl Getter<T>,
        get_timeout: Duration,
        old_data_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            getter: Arc::new(getter),
            get_timeout,
            old_data_timeout,
            state: Arc::new(Mutex::new(State {
                cached: None,
                in_flight: None,
            })),
        }
    }

    /// Singleton with the default wait and staleness bounds.
    pub fn with_defaults(name: impl Into<String>, getter: impl Getter<T>) -> Self {
        Self::new(name, getter, DEFAULT_GET_TIMEOUT, DEFAULT_OLD_DATA_TIMEOUT)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_timeout(&self) -> Duration {
        self.get_timeout
    }

    pub fn old_data_timeout(&self) -> Duration {
        self.old_data_timeout
    }

    /// Fresh or bounded-stale value, `None` when nothing usable is available.
    pub async fn try_get(&self) -> Option<T> {
        self.lookup().await.into_value()
    }

    pub async fn lookup(&self) -> Lookup<T> {
        let mut done = self.ensure_refresh();

        let refreshed = match tokio::time::timeout(
            self.get_timeout,
            done.wait_for(Option::is_some),
        )
        .await
        {
            Ok(Ok(outcome)) => *outcome == Some(true),
            // Sender gone without a result: the refresh task was torn down.
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::debug!(
                    singleton = %self.name,
                    timeout = ?self.get_timeout,
                    "refresh still running, falling back to cached data"
                );
                false
            }
        };

        let state = self.lock();
        let Some(cached) = state.cached.as_ref() else {
            return Lookup::Absent;
        };
        if refreshed {
            return Lookup::Fresh(cached.value.clone());
        }

        let age = cached.produced_at.elapsed();
        if age < self.old_data_timeout {
            tracing::debug!(singleton = %self.name, ?age, "serving stale data");
            Lookup::Stale {
                value: cached.value.clone(),
                age,
            }
        } else {
            Lookup::Absent
        }
    }

    /// Instant the cached value was produced, if any.
    pub fn last_produced_at(&self) -> Option<Instant> {
        self.lock().cached.as_ref().map(|c| c.produced_at)
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the in-flight refresh, or start one.
    fn ensure_refresh(&self) -> RefreshDone {
        let mut state = self.lock();
        if let Some(done) = state.in_flight.as_ref() {
            return done.clone();
        }

        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(rx.clone());
        drop(state);

        let getter = Arc::clone(&self.getter);
        let shared = Arc::clone(&self.state);
        let name = self.name.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = AssertUnwindSafe(getter.get()).catch_unwind().await;

            let (value, failure) = match result {
                Ok(Ok(value)) => (Some(value), None),
                Ok(Err(err)) => (None, Some(err.to_string())),
                Err(_) => (None, Some("getter panicked".to_string())),
            };
            let succeeded = value.is_some();

            {
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(value) = value {
                    state.cached = Some(CachedResult {
                        value,
                        produced_at: Instant::now(),
                    });
                }
                state.in_flight = None;
                // Waiters may all have given up already.
                let _ = tx.send(Some(succeeded));
            }

            match failure {
                Some(error) => {
                    tracing::warn!(singleton = %name, %error, elapsed = ?started.elapsed(), "refresh failed");
                }
                None => {
                    tracing::trace!(singleton = %name, elapsed = ?started.elapsed(), "refresh completed");
                }
            }
        });

        rx
    }
}

impl<T> fmt::Debug for Singleton<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singleton")
            .field("name", &self.name)
            .field("get_timeout", &self.get_timeout)
            .field("old_data_timeout", &self.old_data_timeout)
            .finish_non_exhaustive()
    }
}
