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

use super::builder::render;
use super::metric::MetricFamily;

/// Everything one collection cycle publishes.
///
/// `encoded` holds exposition text produced by the `prometheus` crate
/// (command latency); it is appended after the rendered families.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    families: Vec<MetricFamily>,
    encoded: String,
}

impl Snapshot {
    pub fn new(families: Vec<MetricFamily>) -> Self {
        Self {
            families,
            encoded: String::new(),
        }
    }

    pub fn with_encoded(mut self, encoded: impl Into<String>) -> Self {
        self.encoded = encoded.into();
        self
    }

    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn render(&self) -> String {
        let mut text = render(&self.families);
        text.push_str(&self.encoded);
        text
    }
}

impl From<Vec<MetricFamily>> for Snapshot {
    fn from(families: Vec<MetricFamily>) -> Self {
        Self::new(families)
    }
}
