//! Prometheus text exposition
//!
//! Renders every family of a [`MetricsRegistry`] with `# HELP` and `# TYPE`
//! lines followed by one sample line per series.

use std::fmt::Write;

use crate::registry::MetricsRegistry;

/// Content type of the Prometheus text format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Formats a registry in Prometheus text format
#[derive(Debug, Default)]
pub struct PrometheusExporter;

impl PrometheusExporter {
    pub fn new() -> Self {
        Self
    }

    /// Export all families in the registry
    pub fn export(&self, registry: &MetricsRegistry) -> String {
        let mut output = String::with_capacity(4 * 1024);

        for (name, family) in registry.families() {
            if !family.help.is_empty() {
                self.write_help(&mut output, &name, &family.help);
            }
            self.write_type(&mut output, &name, family.kind.as_str());
            for (labels, value) in &family.series {
                self.write_metric_with_labels(&mut output, &name, *value, labels);
            }
        }

        output
    }

    fn write_help(&self, output: &mut String, name: &str, help: &str) {
        let _ = writeln!(output, "# HELP {} {}", name, escape_help(help));
    }

    fn write_type(&self, output: &mut String, name: &str, metric_type: &str) {
        let _ = writeln!(output, "# TYPE {} {}", name, metric_type);
    }

    fn write_metric_with_labels(
        &self,
        output: &mut String,
        name: &str,
        value: f64,
        labels: &[(String, String)],
    ) {
        if labels.is_empty() {
            let _ = writeln!(output, "{} {}", name, format_value(value));
            return;
        }
        let labels_str: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
            .collect();
        let _ = writeln!(
            output,
            "{}{{{}}} {}",
            name,
            labels_str.join(","),
            format_value(value)
        );
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}
