#![forbid(unsafe_code)]

//! Aggregates chat metrics into a health status and a 0–100 health score,
//! with an optional periodic check loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chat_metrics::ChatMetrics;
use crate::logger::{CHAT_ERRORS, CRITICAL_ERRORS};

pub const HEALTH_SCORE: &str = "coachly_chat_health_score";

/// Overall system health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

impl HealthState {
	pub const fn as_str(self) -> &'static str {
		match self {
			HealthState::Healthy => "healthy",
			HealthState::Degraded => "degraded",
			HealthState::Unhealthy => "unhealthy",
		}
	}
}

/// Point-in-time health snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatHealthStatus {
	pub status: HealthState,
	pub message_success_rate: f64,
	pub connection_success_rate: f64,
	pub average_delivery_ms: f64,
	pub active_connections: i64,
	pub critical_errors: u64,
	pub timestamp: DateTime<Utc>,
}

/// Health monitor over a shared `ChatMetrics`.
#[derive(Debug)]
pub struct ChatSystemMonitor {
	metrics: Arc<ChatMetrics>,
	last_health: Mutex<Option<ChatHealthStatus>>,
	health_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSystemMonitor {
	pub fn new(metrics: Arc<ChatMetrics>) -> Self {
		Self {
			metrics,
			last_health: Mutex::new(None),
			health_task: Mutex::new(None),
		}
	}

	/// Compute the current health status and cache it as last known.
	///
	/// Non-healthy results are logged as warnings with the contributing
	/// numbers.
	pub fn health_status(&self) -> ChatHealthStatus {
		let summary = self.metrics.summary();
		let critical_errors = self.metrics.registry().counter_total(CRITICAL_ERRORS);

		let status = if critical_errors > 0
			|| summary.connection_success_rate < 50.0
			|| summary.message_success_rate < 50.0
		{
			HealthState::Unhealthy
		} else if summary.connection_success_rate < 90.0
			|| summary.message_success_rate < 90.0
			|| summary.average_delivery_ms > 5_000.0
		{
			HealthState::Degraded
		} else {
			HealthState::Healthy
		};

		if status != HealthState::Healthy {
			warn!(
				status = status.as_str(),
				message_success_rate = summary.message_success_rate,
				connection_success_rate = summary.connection_success_rate,
				average_delivery_ms = summary.average_delivery_ms,
				critical_errors,
				"chat system health degraded"
			);
		}

		let health = ChatHealthStatus {
			status,
			message_success_rate: summary.message_success_rate,
			connection_success_rate: summary.connection_success_rate,
			average_delivery_ms: summary.average_delivery_ms,
			active_connections: summary.active_connections,
			critical_errors,
			timestamp: Utc::now(),
		};

		*self.last_health.lock() = Some(health.clone());
		health
	}

	/// Last health status computed by any caller or the check loop.
	pub fn last_known_health(&self) -> Option<ChatHealthStatus> {
		self.last_health.lock().clone()
	}

	/// 0–100 operational score with weighted penalties.
	pub fn health_score(status: &ChatHealthStatus) -> f64 {
		let mut score = 100.0;

		score -= 2.0 * (95.0 - status.message_success_rate).max(0.0);
		score -= 2.0 * (95.0 - status.connection_success_rate).max(0.0);

		if status.average_delivery_ms > 2_000.0 {
			let excess_seconds = (status.average_delivery_ms - 2_000.0) / 1_000.0;
			score -= (5.0 * excess_seconds).min(30.0);
		}

		score -= (10.0 * status.critical_errors as f64).min(50.0);

		score.clamp(0.0, 100.0)
	}

	/// Fuller structured snapshot for export/dashboards.
	pub fn metrics_summary(&self) -> MonitorSnapshot {
		let summary = self.metrics.summary();
		let registry = self.metrics.registry();

		let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
		for (labels, count) in registry.counters_with_name(CHAT_ERRORS) {
			let kind = labels
				.iter()
				.find(|(k, _)| k == "type")
				.map(|(_, v)| v.clone())
				.unwrap_or_else(|| "unknown_error".to_string());
			*by_type.entry(kind).or_insert(0) += count;
		}

		MonitorSnapshot {
			messages: MessageStats {
				sent: summary.messages_sent,
				delivered: summary.messages_delivered,
				failed: summary.messages_failed,
				success_rate: summary.message_success_rate,
				typing_events: summary.typing_events,
			},
			connections: ConnectionStats {
				established: summary.connections_established,
				failed: summary.connections_failed,
				closed: summary.connections_closed,
				reconnect_attempts: summary.reconnect_attempts,
				active: summary.active_connections,
				success_rate: summary.connection_success_rate,
			},
			performance: PerformanceStats {
				average_delivery_ms: summary.average_delivery_ms,
			},
			errors: ErrorStats {
				total: registry.counter_total(CHAT_ERRORS),
				critical: registry.counter_total(CRITICAL_ERRORS),
				by_type,
			},
		}
	}

	/// Run the health check on a periodic timer, publishing the score gauge.
	///
	/// Starting again replaces any running loop.
	pub fn start_health_checks(self: &Arc<Self>, every: Duration) -> HealthCheckHandle {
		let monitor = Arc::clone(self);
		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(every);
			loop {
				ticker.tick().await;

				let health = monitor.health_status();
				let score = Self::health_score(&health);
				monitor.metrics.registry().set_gauge(HEALTH_SCORE, Vec::new(), score);
				metrics::gauge!(HEALTH_SCORE).set(score);

				debug!(status = health.status.as_str(), score, "health check tick");
			}
		});

		let previous = self.health_task.lock().replace(task);
		if let Some(previous) = previous {
			previous.abort();
		}

		HealthCheckHandle {
			monitor: Arc::clone(self),
		}
	}

	/// Stop the periodic health check loop, if running.
	pub fn stop_health_checks(&self) {
		if let Some(task) = self.health_task.lock().take() {
			task.abort();
		}
	}

	/// Clear chat metrics, the registry and the cached last-known health.
	pub fn reset_metrics(&self) {
		self.metrics.clear();
		self.metrics.registry().clear();
		*self.last_health.lock() = None;
	}
}

/// Lets callers stop the check loop without holding the monitor itself.
#[derive(Debug, Clone)]
pub struct HealthCheckHandle {
	monitor: Arc<ChatSystemMonitor>,
}

impl HealthCheckHandle {
	pub fn stop(&self) {
		self.monitor.stop_health_checks();
	}
}

/// Structured snapshot exported by the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
	pub messages: MessageStats,
	pub connections: ConnectionStats,
	pub performance: PerformanceStats,
	pub errors: ErrorStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageStats {
	pub sent: u64,
	pub delivered: u64,
	pub failed: u64,
	pub success_rate: f64,
	pub typing_events: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
	pub established: u64,
	pub failed: u64,
	pub closed: u64,
	pub reconnect_attempts: u64,
	pub active: i64,
	pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
	pub average_delivery_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorStats {
	pub total: u64,
	pub critical: u64,
	pub by_type: BTreeMap<String, u64>,
}
