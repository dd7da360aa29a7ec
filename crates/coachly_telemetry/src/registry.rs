#![forbid(unsafe_code)]

//! Injectable counter/gauge/histogram store keyed by name + labels.
//!
//! Built explicitly and passed into the subscription manager and monitor at
//! startup; tests construct isolated instances instead of reaching into a
//! process-wide singleton. Accumulation is guarded by a mutex so interleaved
//! writers never tear a single increment.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Label pairs attached to a metric series.
pub type Labels = Vec<(String, String)>;

/// Build owned labels from borrowed pairs.
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
	pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Default histogram bucket upper bounds, in milliseconds.
pub const DEFAULT_BUCKET_BOUNDS_MS: [f64; 11] = [
	5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0,
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
	name: String,
	labels: Labels,
}

impl SeriesKey {
	/// Labels are sorted so the same set in any order hits the same series.
	fn new(name: &str, mut labels: Labels) -> Self {
		labels.sort();
		Self {
			name: name.to_string(),
			labels,
		}
	}
}

#[derive(Debug, Clone)]
struct HistogramSeries {
	bounds: Vec<f64>,
	bucket_counts: Vec<u64>,
	sum: f64,
	count: u64,
}

impl HistogramSeries {
	fn new(bounds: &[f64]) -> Self {
		Self {
			bounds: bounds.to_vec(),
			bucket_counts: vec![0; bounds.len()],
			sum: 0.0,
			count: 0,
		}
	}

	fn observe(&mut self, value: f64) {
		for (idx, bound) in self.bounds.iter().enumerate() {
			if value <= *bound {
				self.bucket_counts[idx] += 1;
				break;
			}
		}
		self.sum += value;
		self.count += 1;
	}
}

#[derive(Debug, Default)]
struct Inner {
	counters: HashMap<SeriesKey, u64>,
	gauges: HashMap<SeriesKey, f64>,
	histograms: HashMap<SeriesKey, HistogramSeries>,
}

/// Shared metrics store. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
	inner: Arc<Mutex<Inner>>,
}

impl MetricsRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Increment a monotonic counter series.
	pub fn increment_counter(&self, name: &str, labels: Labels, by: u64) {
		let key = SeriesKey::new(name, labels);
		let mut inner = self.inner.lock();
		*inner.counters.entry(key).or_insert(0) += by;
	}

	/// Set a gauge series to an absolute value.
	pub fn set_gauge(&self, name: &str, labels: Labels, value: f64) {
		let key = SeriesKey::new(name, labels);
		let mut inner = self.inner.lock();
		inner.gauges.insert(key, value);
	}

	/// Add a (possibly negative) delta to a gauge series.
	pub fn add_gauge(&self, name: &str, labels: Labels, delta: f64) {
		let key = SeriesKey::new(name, labels);
		let mut inner = self.inner.lock();
		*inner.gauges.entry(key).or_insert(0.0) += delta;
	}

	/// Record an observation into a histogram series with default buckets.
	pub fn observe_histogram(&self, name: &str, labels: Labels, value: f64) {
		let key = SeriesKey::new(name, labels);
		let mut inner = self.inner.lock();
		inner
			.histograms
			.entry(key)
			.or_insert_with(|| HistogramSeries::new(&DEFAULT_BUCKET_BOUNDS_MS))
			.observe(value);
	}

	/// Read one counter series. Missing series read as 0.
	pub fn counter(&self, name: &str, labels: Labels) -> u64 {
		let key = SeriesKey::new(name, labels);
		let inner = self.inner.lock();
		inner.counters.get(&key).copied().unwrap_or(0)
	}

	/// Sum a counter across all of its label sets.
	pub fn counter_total(&self, name: &str) -> u64 {
		let inner = self.inner.lock();
		inner
			.counters
			.iter()
			.filter(|(k, _)| k.name == name)
			.map(|(_, v)| *v)
			.sum()
	}

	/// All label sets recorded under one counter name.
	pub fn counters_with_name(&self, name: &str) -> Vec<(Labels, u64)> {
		let inner = self.inner.lock();
		let mut out: Vec<(Labels, u64)> = inner
			.counters
			.iter()
			.filter(|(k, _)| k.name == name)
			.map(|(k, v)| (k.labels.clone(), *v))
			.collect();
		out.sort();
		out
	}

	/// Read one gauge series.
	pub fn gauge(&self, name: &str, labels: Labels) -> Option<f64> {
		let key = SeriesKey::new(name, labels);
		let inner = self.inner.lock();
		inner.gauges.get(&key).copied()
	}

	/// Mean of all observations under one histogram name, if any.
	pub fn histogram_mean(&self, name: &str) -> Option<f64> {
		let inner = self.inner.lock();
		let mut sum = 0.0;
		let mut count = 0u64;
		for (k, h) in inner.histograms.iter() {
			if k.name == name {
				sum += h.sum;
				count += h.count;
			}
		}
		if count == 0 { None } else { Some(sum / count as f64) }
	}

	/// Drop every recorded series.
	pub fn clear(&self) {
		let mut inner = self.inner.lock();
		inner.counters.clear();
		inner.gauges.clear();
		inner.histograms.clear();
	}

	/// Stable snapshot of everything recorded, sorted by name then labels.
	pub fn snapshot(&self) -> MetricsSnapshot {
		let inner = self.inner.lock();

		let mut counters: Vec<(String, Labels, u64)> = inner
			.counters
			.iter()
			.map(|(k, v)| (k.name.clone(), k.labels.clone(), *v))
			.collect();
		counters.sort();

		let mut gauges: Vec<(String, Labels, f64)> = inner
			.gauges
			.iter()
			.map(|(k, v)| (k.name.clone(), k.labels.clone(), *v))
			.collect();
		gauges.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

		let mut histograms: Vec<(String, Labels, HistogramSnapshot)> = inner
			.histograms
			.iter()
			.map(|(k, h)| {
				(
					k.name.clone(),
					k.labels.clone(),
					HistogramSnapshot {
						bounds: h.bounds.clone(),
						bucket_counts: h.bucket_counts.clone(),
						sum: h.sum,
						count: h.count,
					},
				)
			})
			.collect();
		histograms.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

		MetricsSnapshot {
			counters,
			gauges,
			histograms,
		}
	}
}

/// Point-in-time view of the registry, used by the exporter.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
	pub counters: Vec<(String, Labels, u64)>,
	pub gauges: Vec<(String, Labels, f64)>,
	pub histograms: Vec<(String, Labels, HistogramSnapshot)>,
}

/// Snapshot of one histogram series (non-cumulative bucket counts).
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
	pub bounds: Vec<f64>,
	pub bucket_counts: Vec<u64>,
	pub sum: f64,
	pub count: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn label_order_is_canonical() {
		let registry = MetricsRegistry::new();
		registry.increment_counter("c", labels(&[("a", "1"), ("b", "2")]), 1);
		registry.increment_counter("c", labels(&[("b", "2"), ("a", "1")]), 2);

		assert_eq!(registry.counter("c", labels(&[("a", "1"), ("b", "2")])), 3);
		assert_eq!(registry.counters_with_name("c").len(), 1);
	}

	#[test]
	fn counter_total_sums_label_sets() {
		let registry = MetricsRegistry::new();
		registry.increment_counter("c", labels(&[("k", "x")]), 2);
		registry.increment_counter("c", labels(&[("k", "y")]), 3);
		registry.increment_counter("other", Vec::new(), 10);

		assert_eq!(registry.counter_total("c"), 5);
	}

	#[test]
	fn gauges_add_and_set() {
		let registry = MetricsRegistry::new();
		registry.add_gauge("g", Vec::new(), 2.0);
		registry.add_gauge("g", Vec::new(), -1.0);
		assert_eq!(registry.gauge("g", Vec::new()), Some(1.0));

		registry.set_gauge("g", Vec::new(), 7.5);
		assert_eq!(registry.gauge("g", Vec::new()), Some(7.5));
	}

	#[test]
	fn histogram_mean_and_clear() {
		let registry = MetricsRegistry::new();
		assert_eq!(registry.histogram_mean("h"), None);

		registry.observe_histogram("h", Vec::new(), 10.0);
		registry.observe_histogram("h", Vec::new(), 30.0);
		assert_eq!(registry.histogram_mean("h"), Some(20.0));

		registry.clear();
		assert_eq!(registry.histogram_mean("h"), None);
		assert_eq!(registry.counter_total("h"), 0);
	}

	#[test]
	fn histogram_buckets_fill_first_matching_bound() {
		let registry = MetricsRegistry::new();
		registry.observe_histogram("h", Vec::new(), 3.0);
		registry.observe_histogram("h", Vec::new(), 99_999.0);

		let snap = registry.snapshot();
		let (_, _, h) = &snap.histograms[0];
		assert_eq!(h.bucket_counts[0], 1);
		// Above the last bound lands only in the implicit +Inf bucket.
		assert_eq!(h.bucket_counts.iter().sum::<u64>(), 1);
		assert_eq!(h.count, 2);
	}
}
