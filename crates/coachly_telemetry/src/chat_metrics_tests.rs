#![forbid(unsafe_code)]

use crate::chat_metrics::{
	ACTIVE_CONNECTIONS, ChatMetrics, DELIVERY_DURATION_MS, MESSAGES_DELIVERED, MESSAGES_SENT,
};
use crate::registry::{MetricsRegistry, labels};

fn metrics() -> ChatMetrics {
	ChatMetrics::new(MetricsRegistry::new())
}

#[test]
fn success_rates_default_to_100_with_no_data() {
	let m = metrics();
	let summary = m.summary();
	assert_eq!(summary.message_success_rate, 100.0);
	assert_eq!(summary.connection_success_rate, 100.0);
	assert_eq!(summary.active_connections, 0);
}

#[test]
fn delivery_duration_is_opportunistic() {
	let m = metrics();

	// Sender side: timing map has the id, a duration sample is recorded.
	m.record_message_sent("m1", "a", "b");
	m.record_message_delivered("m1", "a", "b");
	assert!(m.registry().histogram_mean(DELIVERY_DURATION_MS).is_some());

	// Recipient side: no sent timestamp, counter still moves, no new sample.
	m.record_message_delivered("m2", "b", "a");
	let summary = m.summary();
	assert_eq!(summary.messages_delivered, 2);
}

#[test]
fn counters_are_labeled_by_participants() {
	let m = metrics();
	m.record_message_sent("m1", "a", "b");
	m.record_message_sent("m2", "a", "b");
	m.record_message_sent("m3", "b", "a");

	assert_eq!(
		m.registry().counter(MESSAGES_SENT, labels(&[("sender", "a"), ("receiver", "b")])),
		2
	);
	assert_eq!(m.registry().counter_total(MESSAGES_SENT), 3);
}

#[test]
fn message_success_rate_tracks_delivered_vs_failed() {
	let m = metrics();
	m.record_message_delivered("m1", "a", "b");
	m.record_message_delivered("m2", "a", "b");
	m.record_message_delivered("m3", "a", "b");
	m.record_message_failed("a", "b", "network_error");

	let summary = m.summary();
	assert_eq!(summary.messages_delivered, 3);
	assert_eq!(summary.messages_failed, 1);
	assert_eq!(summary.message_success_rate, 75.0);
}

#[test]
fn sent_and_delivered_are_not_reconciled() {
	let m = metrics();

	// Delivery driven by the recipient's subscription can outpace local sends.
	m.record_message_delivered("remote-1", "b", "a");
	m.record_message_delivered("remote-2", "b", "a");

	let summary = m.summary();
	assert_eq!(summary.messages_sent, 0);
	assert_eq!(summary.messages_delivered, 2);
}

#[test]
fn active_connections_track_establish_and_close() {
	let m = metrics();
	m.record_connection_established("chat:a:b");
	m.record_connection_established("chat:a:c");
	assert_eq!(m.registry().gauge(ACTIVE_CONNECTIONS, Vec::new()), Some(2.0));

	m.record_connection_closed("chat:a:b");
	assert_eq!(m.registry().gauge(ACTIVE_CONNECTIONS, Vec::new()), Some(1.0));
	assert_eq!(m.summary().active_connections, 1);
}

#[test]
fn connection_success_rate_counts_failures() {
	let m = metrics();
	m.record_connection_established("chat:a:b");
	m.record_connection_failed("chat:a:b", "timeout_error");

	let summary = m.summary();
	assert_eq!(summary.connection_success_rate, 50.0);
}

#[test]
fn clear_resets_timing_maps_but_not_counters() {
	let m = metrics();
	m.record_message_sent("m1", "a", "b");
	m.clear();

	// Counter survives; the delivery no longer finds a sent timestamp.
	assert_eq!(m.registry().counter_total(MESSAGES_SENT), 1);
	m.record_message_delivered("m1", "a", "b");
	assert_eq!(m.registry().counter_total(MESSAGES_DELIVERED), 1);
	assert!(m.registry().histogram_mean(DELIVERY_DURATION_MS).is_none());
}
