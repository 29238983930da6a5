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

use super::metric::{MetricFamily, MetricValue};

/// Helper struct to build Prometheus text exposition
pub struct MetricBuilder {
    metrics: String,
}

impl MetricBuilder {
    pub fn new() -> Self {
        Self {
            metrics: String::new(),
        }
    }

    /// Add a comment line
    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.metrics.push_str("# ");
        self.metrics.push_str(text);
        self.metrics.push('\n');
        self
    }

    /// Add a HELP line
    pub fn help(&mut self, name: &str, description: &str) -> &mut Self {
        let description = description.replace('\\', "\\\\").replace('\n', "\\n");
        self.metrics
            .push_str(&format!("# HELP {name} {description}\n"));
        self
    }

    /// Add a TYPE line
    pub fn type_(&mut self, name: &str, metric_type: &str) -> &mut Self {
        self.metrics
            .push_str(&format!("# TYPE {name} {metric_type}\n"));
        self
    }

    /// Add a metric line with labels
    pub fn metric<'a, I>(&mut self, name: &str, labels: I, value: &MetricValue) -> &mut Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.metrics.push_str(name);

        let mut first = true;
        for (key, label_value) in labels {
            self.metrics.push(if first { '{' } else { ',' });
            first = false;
            self.metrics
                .push_str(&format!("{key}=\"{}\"", escape_label_value(label_value)));
        }
        if !first {
            self.metrics.push('}');
        }

        self.metrics.push(' ');
        self.metrics.push_str(&value.to_string());
        self.metrics.push('\n');
        self
    }

    /// Add a whole family; families without samples produce nothing
    pub fn family(&mut self, family: &MetricFamily) -> &mut Self {
        if family.is_empty() {
            return self;
        }
        self.help(&family.name, &family.help)
            .type_(&family.name, family.kind.as_str());
        for sample in &family.samples {
            self.metric(
                sample.name(),
                sample.labels().iter().map(|(k, v)| (k.as_str(), v.as_str())),
                sample.value(),
            );
        }
        self
    }

    /// Build the final metric string
    pub fn build(self) -> String {
        self.metrics
    }
}

impl Default for MetricBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape backslash, double quote and newline in a label value.
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render families into one exposition document.
pub fn render(families: &[MetricFamily]) -> String {
    let mut builder = MetricBuilder::new();
    for family in families {
        builder.family(family);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::metric::MetricKind;

    #[test]
    fn test_metric_line_format() {
        let mut builder = MetricBuilder::new();
        builder.metric(
            "nvidiasmi_utilization_gpu",
            [("minor_number", "0"), ("uuid", "GPU-1")],
            &MetricValue(98.0),
        );
        assert_eq!(
            builder.build(),
            "nvidiasmi_utilization_gpu{minor_number=\"0\",uuid=\"GPU-1\"} 98\n"
        );
    }

    #[test]
    fn test_metric_without_labels() {
        let mut builder = MetricBuilder::new();
        let no_labels: [(&str, &str); 0] = [];
        builder.metric("process_blocked_count", no_labels, &MetricValue(3.0));
        assert_eq!(builder.build(), "process_blocked_count 3\n");
    }

    #[test]
    fn test_label_escaping() {
        assert_eq!(escape_label_value(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label_value("x\ny"), "x\\ny");
    }

    #[test]
    fn test_render_skips_empty_families() {
        let empty = MetricFamily::gauge("task_gpu_percent", "GPU utilization of a task");
        let mut cpu =
            MetricFamily::new("task_cpu_percent", "CPU usage of a task", MetricKind::Gauge);
        cpu.add([("container_id", "abc")], 24.45);

        let text = render(&[empty, cpu]);
        assert!(!text.contains("task_gpu_percent"));
        assert_eq!(
            text,
            "# HELP task_cpu_percent CPU usage of a task\n\
             # TYPE task_cpu_percent gauge\n\
             task_cpu_percent{container_id=\"abc\"} 24.45\n"
        );
    }
}
