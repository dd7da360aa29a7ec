#![forbid(unsafe_code)]

//! Chat-specific counters, gauges and histograms on top of the registry.
//!
//! Sent, delivered and failed counters are driven by different event sources
//! (local send vs. remote row-insert observed by the recipient), so they do
//! not reconcile into a closed ledger. That is intentional: this is
//! approximate telemetry, not accounting.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::registry::{MetricsRegistry, labels};

pub const MESSAGES_SENT: &str = "coachly_chat_messages_sent_total";
pub const MESSAGES_DELIVERED: &str = "coachly_chat_messages_delivered_total";
pub const MESSAGES_FAILED: &str = "coachly_chat_messages_failed_total";
pub const CONNECTIONS_ESTABLISHED: &str = "coachly_chat_connections_established_total";
pub const CONNECTIONS_FAILED: &str = "coachly_chat_connections_failed_total";
pub const CONNECTIONS_CLOSED: &str = "coachly_chat_connections_closed_total";
pub const RECONNECT_ATTEMPTS: &str = "coachly_chat_reconnect_attempts_total";
pub const TYPING_EVENTS: &str = "coachly_chat_typing_events_total";
pub const MESSAGE_SUCCESS_RATE: &str = "coachly_chat_message_success_rate";
pub const CONNECTION_SUCCESS_RATE: &str = "coachly_chat_connection_success_rate";
pub const ACTIVE_CONNECTIONS: &str = "coachly_chat_active_connections";
pub const DELIVERY_DURATION_MS: &str = "coachly_chat_message_delivery_duration_ms";
pub const CONNECTION_DURATION_MS: &str = "coachly_chat_connection_duration_ms";

/// Chat metrics facade. Share via `Arc`.
#[derive(Debug)]
pub struct ChatMetrics {
	registry: MetricsRegistry,

	/// Send instants by message id, for opportunistic delivery timing.
	sent_at: Mutex<HashMap<String, Instant>>,

	/// Connect instants by channel name, for connection duration.
	connected_at: Mutex<HashMap<String, Instant>>,
}

impl ChatMetrics {
	pub fn new(registry: MetricsRegistry) -> Self {
		Self {
			registry,
			sent_at: Mutex::new(HashMap::new()),
			connected_at: Mutex::new(HashMap::new()),
		}
	}

	pub fn registry(&self) -> &MetricsRegistry {
		&self.registry
	}

	/// Record a locally sent message and start its delivery timer.
	pub fn record_message_sent(&self, message_id: &str, sender: &str, receiver: &str) {
		self.registry
			.increment_counter(MESSAGES_SENT, labels(&[("sender", sender), ("receiver", receiver)]), 1);
		metrics::counter!(MESSAGES_SENT).increment(1);

		self.sent_at.lock().insert(message_id.to_string(), Instant::now());
	}

	/// Record a delivered message, keyed by the message's own ids.
	///
	/// Delivery duration is recorded only when a sent timestamp for that id
	/// is still tracked; otherwise the sample is skipped.
	pub fn record_message_delivered(&self, message_id: &str, sender: &str, receiver: &str) {
		self.registry.increment_counter(
			MESSAGES_DELIVERED,
			labels(&[("sender", sender), ("receiver", receiver)]),
			1,
		);
		metrics::counter!(MESSAGES_DELIVERED).increment(1);

		match self.sent_at.lock().remove(message_id) {
			Some(sent) => {
				let elapsed_ms = sent.elapsed().as_secs_f64() * 1_000.0;
				self.registry.observe_histogram(DELIVERY_DURATION_MS, Vec::new(), elapsed_ms);
			}
			None => {
				warn!(message_id, "no sent timestamp for delivered message; skipping duration sample");
			}
		}

		self.update_message_success_rate();
	}

	/// Record a message that could not be sent.
	pub fn record_message_failed(&self, sender: &str, receiver: &str, error_type: &str) {
		self.registry.increment_counter(
			MESSAGES_FAILED,
			labels(&[("sender", sender), ("receiver", receiver), ("error_type", error_type)]),
			1,
		);
		metrics::counter!(MESSAGES_FAILED).increment(1);

		self.update_message_success_rate();
	}

	/// Record a channel reaching `SUBSCRIBED`.
	pub fn record_connection_established(&self, channel: &str) {
		self.registry
			.increment_counter(CONNECTIONS_ESTABLISHED, labels(&[("channel", channel)]), 1);
		metrics::counter!(CONNECTIONS_ESTABLISHED).increment(1);

		self.registry.add_gauge(ACTIVE_CONNECTIONS, Vec::new(), 1.0);
		metrics::gauge!(ACTIVE_CONNECTIONS).increment(1.0);

		self.connected_at.lock().insert(channel.to_string(), Instant::now());
		self.update_connection_success_rate();
	}

	/// Record a failed connection attempt on a channel.
	pub fn record_connection_failed(&self, channel: &str, error_type: &str) {
		self.registry.increment_counter(
			CONNECTIONS_FAILED,
			labels(&[("channel", channel), ("error_type", error_type)]),
			1,
		);
		metrics::counter!(CONNECTIONS_FAILED).increment(1);

		self.update_connection_success_rate();
	}

	/// Record an explicit channel teardown.
	pub fn record_connection_closed(&self, channel: &str) {
		self.registry
			.increment_counter(CONNECTIONS_CLOSED, labels(&[("channel", channel)]), 1);
		metrics::counter!(CONNECTIONS_CLOSED).increment(1);

		self.registry.add_gauge(ACTIVE_CONNECTIONS, Vec::new(), -1.0);
		metrics::gauge!(ACTIVE_CONNECTIONS).decrement(1.0);

		if let Some(connected) = self.connected_at.lock().remove(channel) {
			let elapsed_ms = connected.elapsed().as_secs_f64() * 1_000.0;
			self.registry
				.observe_histogram(CONNECTION_DURATION_MS, Vec::new(), elapsed_ms);
		}
	}

	/// Record one automatic reconnection attempt.
	pub fn record_reconnect_attempt(&self, channel: &str, attempt: u32) {
		self.registry.increment_counter(
			RECONNECT_ATTEMPTS,
			labels(&[("channel", channel), ("attempt", &attempt.to_string())]),
			1,
		);
		metrics::counter!(RECONNECT_ATTEMPTS).increment(1);
	}

	/// Record a typing indicator send attempt.
	pub fn record_typing_event(&self, sender: &str, receiver: &str) {
		self.registry
			.increment_counter(TYPING_EVENTS, labels(&[("sender", sender), ("receiver", receiver)]), 1);
		metrics::counter!(TYPING_EVENTS).increment(1);
	}

	/// Recompute all aggregates from the registry. No caching.
	pub fn summary(&self) -> ChatMetricsSummary {
		let messages_sent = self.registry.counter_total(MESSAGES_SENT);
		let messages_delivered = self.registry.counter_total(MESSAGES_DELIVERED);
		let messages_failed = self.registry.counter_total(MESSAGES_FAILED);
		let connections_established = self.registry.counter_total(CONNECTIONS_ESTABLISHED);
		let connections_failed = self.registry.counter_total(CONNECTIONS_FAILED);
		let connections_closed = self.registry.counter_total(CONNECTIONS_CLOSED);

		ChatMetricsSummary {
			messages_sent,
			messages_delivered,
			messages_failed,
			message_success_rate: success_rate(messages_delivered, messages_failed),
			connections_established,
			connections_failed,
			connections_closed,
			connection_success_rate: success_rate(connections_established, connections_failed),
			reconnect_attempts: self.registry.counter_total(RECONNECT_ATTEMPTS),
			typing_events: self.registry.counter_total(TYPING_EVENTS),
			active_connections: self.registry.gauge(ACTIVE_CONNECTIONS, Vec::new()).unwrap_or(0.0) as i64,
			average_delivery_ms: self.registry.histogram_mean(DELIVERY_DURATION_MS).unwrap_or(0.0),
		}
	}

	/// Reset the per-message and per-channel timing maps.
	pub fn clear(&self) {
		self.sent_at.lock().clear();
		self.connected_at.lock().clear();
	}

	fn update_message_success_rate(&self) {
		let delivered = self.registry.counter_total(MESSAGES_DELIVERED);
		let failed = self.registry.counter_total(MESSAGES_FAILED);
		let rate = success_rate(delivered, failed);
		self.registry.set_gauge(MESSAGE_SUCCESS_RATE, Vec::new(), rate);
		metrics::gauge!(MESSAGE_SUCCESS_RATE).set(rate);
	}

	fn update_connection_success_rate(&self) {
		let established = self.registry.counter_total(CONNECTIONS_ESTABLISHED);
		let failed = self.registry.counter_total(CONNECTIONS_FAILED);
		let rate = success_rate(established, failed);
		self.registry.set_gauge(CONNECTION_SUCCESS_RATE, Vec::new(), rate);
		metrics::gauge!(CONNECTION_SUCCESS_RATE).set(rate);
	}
}

/// `ok / (ok + failed) * 100`, defaulting to 100 with no data.
fn success_rate(ok: u64, failed: u64) -> f64 {
	let total = ok + failed;
	if total == 0 {
		100.0
	} else {
		ok as f64 / total as f64 * 100.0
	}
}

/// Aggregate view recomputed on demand from the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMetricsSummary {
	pub messages_sent: u64,
	pub messages_delivered: u64,
	pub messages_failed: u64,
	pub message_success_rate: f64,
	pub connections_established: u64,
	pub connections_failed: u64,
	pub connections_closed: u64,
	pub connection_success_rate: f64,
	pub reconnect_attempts: u64,
	pub typing_events: u64,
	pub active_connections: i64,
	pub average_delivery_ms: f64,
}
