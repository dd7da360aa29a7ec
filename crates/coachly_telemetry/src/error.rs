#![forbid(unsafe_code)]

//! Chat error taxonomy: classification drives log level, counters and the
//! health monitor, never control flow.

use core::fmt;

/// Classified chat errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatErrorKind {
	Connection,
	MessageDelivery,
	Authentication,
	Validation,
	Network,
	Server,
	Timeout,
	Permission,
	RateLimit,
	Unknown,
}

impl ChatErrorKind {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			ChatErrorKind::Connection => "connection_error",
			ChatErrorKind::MessageDelivery => "message_delivery_error",
			ChatErrorKind::Authentication => "authentication_error",
			ChatErrorKind::Validation => "validation_error",
			ChatErrorKind::Network => "network_error",
			ChatErrorKind::Server => "server_error",
			ChatErrorKind::Timeout => "timeout_error",
			ChatErrorKind::Permission => "permission_error",
			ChatErrorKind::RateLimit => "rate_limit_error",
			ChatErrorKind::Unknown => "unknown_error",
		}
	}

	/// Fixed user-impact mapping.
	pub const fn user_impact(self) -> UserImpact {
		match self {
			ChatErrorKind::Authentication | ChatErrorKind::Permission => UserImpact::Critical,
			ChatErrorKind::Connection | ChatErrorKind::MessageDelivery | ChatErrorKind::Server => UserImpact::High,
			ChatErrorKind::Network | ChatErrorKind::Timeout | ChatErrorKind::RateLimit | ChatErrorKind::Unknown => {
				UserImpact::Medium
			}
			ChatErrorKind::Validation => UserImpact::Low,
		}
	}

	/// Fixed retryability mapping.
	pub const fn retryability(self) -> Retryability {
		match self {
			ChatErrorKind::Network
			| ChatErrorKind::Timeout
			| ChatErrorKind::Server
			| ChatErrorKind::Connection
			| ChatErrorKind::MessageDelivery => Retryability::Retryable,
			ChatErrorKind::RateLimit => Retryability::RetryableAfterDelay,
			ChatErrorKind::Authentication
			| ChatErrorKind::Permission
			| ChatErrorKind::Validation
			| ChatErrorKind::Unknown => Retryability::NotRetryable,
		}
	}
}

impl fmt::Display for ChatErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Severity of an error from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserImpact {
	Critical,
	High,
	Medium,
	Low,
}

impl UserImpact {
	pub const fn as_str(self) -> &'static str {
		match self {
			UserImpact::Critical => "critical",
			UserImpact::High => "high",
			UserImpact::Medium => "medium",
			UserImpact::Low => "low",
		}
	}
}

impl fmt::Display for UserImpact {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Retryability {
	Retryable,
	RetryableAfterDelay,
	NotRetryable,
}

impl Retryability {
	pub const fn as_str(self) -> &'static str {
		match self {
			Retryability::Retryable => "retryable",
			Retryability::RetryableAfterDelay => "retryable_after_delay",
			Retryability::NotRetryable => "not_retryable",
		}
	}
}

impl fmt::Display for Retryability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn impact_mapping() {
		assert_eq!(ChatErrorKind::Authentication.user_impact(), UserImpact::Critical);
		assert_eq!(ChatErrorKind::Permission.user_impact(), UserImpact::Critical);
		assert_eq!(ChatErrorKind::Connection.user_impact(), UserImpact::High);
		assert_eq!(ChatErrorKind::MessageDelivery.user_impact(), UserImpact::High);
		assert_eq!(ChatErrorKind::Server.user_impact(), UserImpact::High);
		assert_eq!(ChatErrorKind::Network.user_impact(), UserImpact::Medium);
		assert_eq!(ChatErrorKind::Timeout.user_impact(), UserImpact::Medium);
		assert_eq!(ChatErrorKind::RateLimit.user_impact(), UserImpact::Medium);
		assert_eq!(ChatErrorKind::Validation.user_impact(), UserImpact::Low);
	}

	#[test]
	fn retryability_mapping() {
		assert_eq!(ChatErrorKind::Network.retryability(), Retryability::Retryable);
		assert_eq!(ChatErrorKind::Timeout.retryability(), Retryability::Retryable);
		assert_eq!(ChatErrorKind::Server.retryability(), Retryability::Retryable);
		assert_eq!(ChatErrorKind::Connection.retryability(), Retryability::Retryable);
		assert_eq!(ChatErrorKind::RateLimit.retryability(), Retryability::RetryableAfterDelay);
		assert_eq!(ChatErrorKind::Authentication.retryability(), Retryability::NotRetryable);
		assert_eq!(ChatErrorKind::Validation.retryability(), Retryability::NotRetryable);
	}

	#[test]
	fn stable_identifiers() {
		assert_eq!(ChatErrorKind::RateLimit.as_str(), "rate_limit_error");
		assert_eq!(UserImpact::High.to_string(), "high");
		assert_eq!(Retryability::RetryableAfterDelay.as_str(), "retryable_after_delay");
	}
}
