#![forbid(unsafe_code)]

//! Prometheus text exposition rendering for chat metrics.
//!
//! Serializes every registry series whose metric name contains `chat` into
//! the standard format: HELP/TYPE headers, cumulative buckets with a `+Inf`
//! terminator for histograms, and single value lines for counters/gauges.

use std::fmt::Write as _;

use crate::registry::{Labels, MetricsRegistry};

const NAME_FILTER: &str = "chat";

/// Render all chat metrics in Prometheus text exposition format.
pub fn render_prometheus(registry: &MetricsRegistry) -> String {
	let snapshot = registry.snapshot();
	let mut out = String::new();

	let mut last_header: Option<String> = None;

	for (name, labels, value) in &snapshot.counters {
		if !name.contains(NAME_FILTER) {
			continue;
		}
		write_header(&mut out, &mut last_header, name, "counter");
		let _ = writeln!(out, "{}{} {}", name, render_labels(labels), value);
	}

	last_header = None;
	for (name, labels, value) in &snapshot.gauges {
		if !name.contains(NAME_FILTER) {
			continue;
		}
		write_header(&mut out, &mut last_header, name, "gauge");
		let _ = writeln!(out, "{}{} {}", name, render_labels(labels), format_value(*value));
	}

	last_header = None;
	for (name, labels, hist) in &snapshot.histograms {
		if !name.contains(NAME_FILTER) {
			continue;
		}
		write_header(&mut out, &mut last_header, name, "histogram");

		let mut cumulative = 0u64;
		for (bound, count) in hist.bounds.iter().zip(hist.bucket_counts.iter()) {
			cumulative += count;
			let _ = writeln!(
				out,
				"{}_bucket{} {}",
				name,
				render_labels_with_le(labels, &format_value(*bound)),
				cumulative
			);
		}
		let _ = writeln!(out, "{}_bucket{} {}", name, render_labels_with_le(labels, "+Inf"), hist.count);
		let _ = writeln!(out, "{}_sum{} {}", name, render_labels(labels), format_value(hist.sum));
		let _ = writeln!(out, "{}_count{} {}", name, render_labels(labels), hist.count);
	}

	out
}

fn write_header(out: &mut String, last: &mut Option<String>, name: &str, kind: &str) {
	if last.as_deref() == Some(name) {
		return;
	}
	let _ = writeln!(out, "# HELP {name} {}", help_text(name));
	let _ = writeln!(out, "# TYPE {name} {kind}");
	*last = Some(name.to_string());
}

fn help_text(name: &str) -> String {
	name.replace('_', " ")
}

fn render_labels(labels: &Labels) -> String {
	if labels.is_empty() {
		return String::new();
	}
	let body: Vec<String> = labels.iter().map(|(k, v)| format!("{k}=\"{}\"", escape(v))).collect();
	format!("{{{}}}", body.join(","))
}

fn render_labels_with_le(labels: &Labels, le: &str) -> String {
	let mut body: Vec<String> = labels.iter().map(|(k, v)| format!("{k}=\"{}\"", escape(v))).collect();
	body.push(format!("le=\"{le}\""));
	format!("{{{}}}", body.join(","))
}

fn escape(value: &str) -> String {
	value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Trim trailing `.0` from whole numbers so bounds render as `5`, not `5.0`.
fn format_value(value: f64) -> String {
	if value.fract() == 0.0 && value.abs() < 1e15 {
		format!("{}", value as i64)
	} else {
		format!("{value}")
	}
}
