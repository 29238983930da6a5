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

use std::collections::BTreeMap;
use std::fmt;

/// Numeric value carried by a single sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue(pub f64);

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        if v.is_nan() {
            write!(f, "NaN")
        } else if v.is_infinite() {
            write!(f, "{}", if v > 0.0 { "+Inf" } else { "-Inf" })
        } else {
            write!(f, "{v}")
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue(value)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue(value as f64)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue(value as f64)
    }
}

/// A single sample: name, flat label set and value.
///
/// Labels are kept in a sorted map so that equality is structural and
/// rendering is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    labels: BTreeMap<String, String>,
    value: MetricValue,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            value: value.into(),
        }
    }

    /// Adds a label, replacing any previous value for the same key.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_labels<K, V, I>(mut self, labels: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in labels {
            self.labels.insert(k.into(), v.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    pub fn as_f64(&self) -> f64 {
        self.value.0
    }
}

/// Exposition type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// Samples sharing one name, help text and type.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub samples: Vec<Metric>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, help: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            samples: Vec::new(),
        }
    }

    pub fn gauge(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::new(name, help, MetricKind::Gauge)
    }

    pub fn counter(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::new(name, help, MetricKind::Counter)
    }

    /// Pushes a sample named after the family.
    pub fn add<K, V, I>(&mut self, labels: I, value: impl Into<MetricValue>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let metric = Metric::new(self.name.clone(), value).with_labels(labels);
        self.samples.push(metric);
        self
    }

    pub fn push(&mut self, metric: Metric) -> &mut Self {
        self.samples.push(metric);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
