// Gateway interfaces consumed by the transition orchestrator
//
// Each gateway is an opaque remote service. Adapters translate their own
// transport failures into `GatewayError`; only retryable variants are retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::lifecycle::{
    DeadLetterEnvelope, EntityStateRecord, PreconditionVerdict, StateChangeEvent, StateName,
    WorkflowContext,
};

pub mod file;
pub mod location;
pub mod memory;
pub mod notifier;

pub use file::{read_json_lines, JsonFileStateStore, JsonLinesDeadLetterSink, JsonLinesNotifier};
pub use location::LocationValidator;
pub use memory::{
    InMemoryStateStore, RecordingDeadLetterSink, RecordingNotifier, StaticValidator, StoreCall,
    StoreOperation,
};
pub use notifier::LogNotifier;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Which collaborator produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    StateStore,
    Validator,
    Notifier,
    DeadLetter,
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gateway::StateStore => "state store",
            Gateway::Validator => "precondition validator",
            Gateway::Notifier => "change notifier",
            Gateway::DeadLetter => "dead-letter channel",
        })
    }
}

/// Transport-level failure reported by a gateway
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{gateway} unavailable: {message}")]
    Unavailable { gateway: Gateway, message: String },

    #[error("{gateway} timed out after {timeout_ms}ms")]
    Timeout { gateway: Gateway, timeout_ms: u64 },

    #[error("{gateway} throttled the request")]
    Throttled { gateway: Gateway },

    #[error("{gateway} rejected the request: {message}")]
    Rejected { gateway: Gateway, message: String },
}

impl GatewayError {
    pub fn unavailable(gateway: Gateway, message: impl Into<String>) -> Self {
        GatewayError::Unavailable {
            gateway,
            message: message.into(),
        }
    }

    pub fn rejected(gateway: Gateway, message: impl Into<String>) -> Self {
        GatewayError::Rejected {
            gateway,
            message: message.into(),
        }
    }

    pub fn gateway(&self) -> Gateway {
        match self {
            GatewayError::Unavailable { gateway, .. }
            | GatewayError::Timeout { gateway, .. }
            | GatewayError::Throttled { gateway }
            | GatewayError::Rejected { gateway, .. } => *gateway,
        }
    }

    /// Timeouts, throttling and connectivity failures are transient.
    /// A rejected request will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GatewayError::Rejected { .. })
    }
}

/// Key-value store holding the current state of each rider
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a record; `Ok(None)` when the entity has never been stored
    async fn get(&self, entity_id: &str) -> Result<Option<EntityStateRecord>, GatewayError>;

    /// Set the entity's current state, creating the record if absent
    async fn conditional_update(
        &self,
        entity_id: &str,
        new_state: StateName,
    ) -> Result<(), GatewayError>;
}

/// External check run before validated transitions
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PreconditionValidator: Send + Sync {
    async fn validate(&self, context: &WorkflowContext)
        -> Result<PreconditionVerdict, GatewayError>;
}

/// Publish/subscribe channel for state change events
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn publish(&self, event: &StateChangeEvent) -> Result<(), GatewayError>;
}

/// Holding area for requests that could not be completed
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, envelope: &DeadLetterEnvelope) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rejections_are_terminal() {
        assert!(GatewayError::unavailable(Gateway::StateStore, "down").is_retryable());
        assert!(GatewayError::Throttled {
            gateway: Gateway::Notifier
        }
        .is_retryable());
        assert!(GatewayError::Timeout {
            gateway: Gateway::Validator,
            timeout_ms: 3000
        }
        .is_retryable());
        assert!(!GatewayError::rejected(Gateway::DeadLetter, "bad payload").is_retryable());
    }

    #[test]
    fn test_error_messages_name_the_gateway() {
        let error = GatewayError::unavailable(Gateway::StateStore, "connection refused");
        assert_eq!(error.to_string(), "state store unavailable: connection refused");
        assert_eq!(error.gateway(), Gateway::StateStore);
    }
}
