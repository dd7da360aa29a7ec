#![forbid(unsafe_code)]

//! Retry wrapper for request-shaped operations (message send, history load).
//!
//! Transient failures are retried with exponential backoff; the terminal
//! failure is classified and logged once through the chat logger. Aborted
//! requests are treated as caller intent and never retried or logged.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use coachly_telemetry::{ChatErrorKind, ChatLogger};
use thiserror::Error;
use tracing::warn;

/// What is being requested, for log lines only.
#[derive(Debug, Clone)]
pub struct RequestDesc {
	pub url: String,
	pub method: String,
}

impl RequestDesc {
	pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			method: method.into(),
		}
	}
}

/// Retry policy for request-shaped operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_millis(500),
		}
	}
}

/// Failure of one request attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
	/// Cancelled by the caller; never retried, never logged as a failure.
	#[error("request aborted")]
	Aborted,
	#[error("network error: {0}")]
	Network(String),
	#[error("http status {0}")]
	Status(u16),
	#[error("{0}")]
	Other(String),
}

impl RequestError {
	/// Network failures and server-side statuses are worth retrying; client
	/// errors are not.
	pub fn is_retryable(&self) -> bool {
		match self {
			RequestError::Network(_) => true,
			RequestError::Status(code) => *code >= 500,
			RequestError::Aborted | RequestError::Other(_) => false,
		}
	}

	/// Classification for the terminal log line.
	pub fn kind(&self) -> ChatErrorKind {
		match self {
			RequestError::Network(_) => ChatErrorKind::Network,
			RequestError::Status(401) | RequestError::Status(403) => ChatErrorKind::Authentication,
			RequestError::Status(429) => ChatErrorKind::RateLimit,
			RequestError::Status(code) if *code >= 500 => ChatErrorKind::Server,
			RequestError::Aborted | RequestError::Status(_) | RequestError::Other(_) => ChatErrorKind::Unknown,
		}
	}
}

/// Run `op` with retries per `policy`.
///
/// `op` receives the attempt number, counted from 1. Retries are only
/// scheduled for retryable errors with budget left; the final error is logged
/// once with the full request context before being returned.
pub async fn with_retry<T, F, Fut>(
	desc: &RequestDesc,
	policy: &RetryPolicy,
	logger: &ChatLogger,
	mut op: F,
) -> Result<T, RequestError>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, RequestError>>,
{
	let mut attempt = 1u32;
	loop {
		let err = match op(attempt).await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		if err == RequestError::Aborted {
			return Err(err);
		}

		if err.is_retryable() && attempt <= policy.max_retries {
			let delay = policy.base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
			warn!(
				url = %desc.url,
				method = %desc.method,
				attempt,
				max_retries = policy.max_retries,
				delay_ms = delay.as_millis() as u64,
				error = %err,
				"request failed; retrying"
			);
			tokio::time::sleep(delay).await;
			attempt += 1;
			continue;
		}

		logger.log_error(
			err.kind(),
			"request failed",
			Some(&err),
			&[
				("url", &desc.url),
				("method", &desc.method),
				("total_attempts", &attempt.to_string()),
				("max_retries", &policy.max_retries.to_string()),
				("error_type", err.kind().as_str()),
				("timestamp", &Utc::now().to_rfc3339()),
			],
		);
		return Err(err);
	}
}
