#![forbid(unsafe_code)]

//! Structured chat event/error logger.
//!
//! Every line carries the merged context: the logger's base context (user,
//! peer, channel), the call-site extras and system fields. Errors are
//! classified through the taxonomy, which picks the log level and feeds the
//! error counters the health monitor reads.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::error::ChatErrorKind;
use crate::registry::{MetricsRegistry, labels};

pub const CHAT_EVENTS: &str = "coachly_chat_events_total";
pub const CHAT_ERRORS: &str = "coachly_chat_errors_total";
pub const CRITICAL_ERRORS: &str = "coachly_chat_critical_errors_total";
pub const OPERATION_DURATION_MS: &str = "coachly_chat_operation_duration_ms";

/// Context-carrying logger. Clones share the timer table, not the context.
#[derive(Debug, Clone)]
pub struct ChatLogger {
	registry: MetricsRegistry,
	context: BTreeMap<String, String>,
	timers: Arc<Mutex<HashMap<String, Instant>>>,
}

impl ChatLogger {
	pub fn new(registry: MetricsRegistry) -> Self {
		Self {
			registry,
			context: BTreeMap::new(),
			timers: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Pre-bind base context (e.g. user id, peer id, channel name).
	pub fn with_context(registry: MetricsRegistry, base: &[(&str, &str)]) -> Self {
		let mut logger = Self::new(registry);
		for (k, v) in base {
			logger.context.insert(k.to_string(), v.to_string());
		}
		logger
	}

	/// Derive a logger with extra context. The parent is untouched.
	pub fn child(&self, extra: &[(&str, &str)]) -> Self {
		let mut child = self.clone();
		for (k, v) in extra {
			child.context.insert(k.to_string(), v.to_string());
		}
		child
	}

	pub fn registry(&self) -> &MetricsRegistry {
		&self.registry
	}

	/// Log a chat event at info level and count it by event type and user.
	pub fn log_event(&self, event_type: &str, message: &str, extra: &[(&str, &str)]) {
		let ctx = self.merged_context(extra);
		info!(event = event_type, context = ?ctx, "{message}");

		self.registry.increment_counter(
			CHAT_EVENTS,
			labels(&[("event", event_type), ("user", self.user_label())]),
			1,
		);
		metrics::counter!(CHAT_EVENTS).increment(1);
	}

	/// Log a classified error.
	///
	/// User impact picks the level; every call increments the error counter,
	/// and critical errors additionally feed the monitor's critical counter.
	pub fn log_error(&self, kind: ChatErrorKind, message: &str, source: Option<&dyn fmt::Display>, extra: &[(&str, &str)]) {
		let ctx = self.merged_context(extra);
		let impact = kind.user_impact();
		let retryable = kind.retryability();

		let source = source.map(|e| e.to_string()).unwrap_or_default();
		match impact {
			crate::error::UserImpact::Critical | crate::error::UserImpact::High => {
				error!(
					error_type = kind.as_str(),
					impact = impact.as_str(),
					retryable = retryable.as_str(),
					source = %source,
					context = ?ctx,
					"{message}"
				);
			}
			crate::error::UserImpact::Medium => {
				warn!(
					error_type = kind.as_str(),
					impact = impact.as_str(),
					retryable = retryable.as_str(),
					source = %source,
					context = ?ctx,
					"{message}"
				);
			}
			crate::error::UserImpact::Low => {
				info!(
					error_type = kind.as_str(),
					impact = impact.as_str(),
					retryable = retryable.as_str(),
					source = %source,
					context = ?ctx,
					"{message}"
				);
			}
		}

		self.registry.increment_counter(
			CHAT_ERRORS,
			labels(&[
				("type", kind.as_str()),
				("impact", impact.as_str()),
				("retryable", retryable.as_str()),
				("user", self.user_label()),
			]),
			1,
		);
		metrics::counter!(CHAT_ERRORS).increment(1);

		if impact == crate::error::UserImpact::Critical {
			self.registry.increment_counter(CRITICAL_ERRORS, Vec::new(), 1);
			metrics::counter!(CRITICAL_ERRORS).increment(1);
		}
	}

	/// Start a wall-clock timer under `id`.
	pub fn start_timer(&self, id: &str) {
		self.timers.lock().insert(id.to_string(), Instant::now());
	}

	/// Stop the timer under `id` and log the measured duration.
	///
	/// A missing start is logged as an unknown error and reads as zero rather
	/// than panicking.
	pub fn end_timer(&self, id: &str, operation: &str, extra: &[(&str, &str)]) -> Duration {
		let Some(started) = self.timers.lock().remove(id) else {
			self.log_error(
				ChatErrorKind::Unknown,
				"end_timer called without a matching start_timer",
				None,
				&[("timer_id", id), ("operation", operation)],
			);
			return Duration::ZERO;
		};

		let elapsed = started.elapsed();
		let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
		self.registry
			.observe_histogram(OPERATION_DURATION_MS, labels(&[("operation", operation)]), elapsed_ms);

		let elapsed_label = format!("{elapsed_ms:.1}");
		let mut fields: Vec<(&str, &str)> = vec![("operation", operation), ("duration_ms", &elapsed_label)];
		fields.extend_from_slice(extra);
		self.log_event("operation_timed", "operation completed", &fields);

		elapsed
	}

	fn user_label(&self) -> &str {
		self.context.get("user_id").map(String::as_str).unwrap_or("unknown")
	}

	fn merged_context(&self, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
		let mut ctx = self.context.clone();
		for (k, v) in extra {
			ctx.insert(k.to_string(), v.to_string());
		}
		ctx.insert(
			"environment".to_string(),
			if cfg!(debug_assertions) { "development" } else { "production" }.to_string(),
		);
		ctx.insert("timestamp".to_string(), Utc::now().to_rfc3339());
		ctx
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::labels;

	fn logger() -> ChatLogger {
		ChatLogger::with_context(MetricsRegistry::new(), &[("user_id", "u1"), ("channel", "chat:u1:u2")])
	}

	#[test]
	fn child_merges_without_mutating_parent() {
		let parent = logger();
		let child = parent.child(&[("other_user_id", "u2")]);

		assert_eq!(child.context.get("other_user_id").map(String::as_str), Some("u2"));
		assert_eq!(child.context.get("user_id").map(String::as_str), Some("u1"));
		assert!(parent.context.get("other_user_id").is_none());
	}

	#[test]
	fn events_are_counted_by_type_and_user() {
		let log = logger();
		log.log_event("subscription_started", "subscribed", &[]);
		log.log_event("subscription_started", "subscribed again", &[]);

		let count = log
			.registry()
			.counter(CHAT_EVENTS, labels(&[("event", "subscription_started"), ("user", "u1")]));
		assert_eq!(count, 2);
	}

	#[test]
	fn critical_errors_feed_the_dedicated_counter() {
		let log = logger();
		log.log_error(ChatErrorKind::Authentication, "token rejected", None, &[]);
		log.log_error(ChatErrorKind::Network, "fetch failed", None, &[]);

		assert_eq!(log.registry().counter_total(CRITICAL_ERRORS), 1);
		assert_eq!(log.registry().counter_total(CHAT_ERRORS), 2);
	}

	#[test]
	fn end_timer_without_start_reads_zero_and_logs_unknown() {
		let log = logger();
		let elapsed = log.end_timer("missing", "load_conversation", &[]);

		assert_eq!(elapsed, Duration::ZERO);
		let unknowns = log
			.registry()
			.counters_with_name(CHAT_ERRORS)
			.into_iter()
			.filter(|(ls, _)| ls.iter().any(|(k, v)| k == "type" && v == "unknown_error"))
			.map(|(_, v)| v)
			.sum::<u64>();
		assert_eq!(unknowns, 1);
	}

	#[test]
	fn timers_measure_and_record_histogram() {
		let log = logger();
		log.start_timer("op-1");
		let elapsed = log.end_timer("op-1", "send_message", &[]);

		assert!(elapsed >= Duration::ZERO);
		assert!(log.registry().histogram_mean(OPERATION_DURATION_MS).is_some());
	}
}
