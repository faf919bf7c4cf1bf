// Accumulated per-run context and the payloads built from it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::table::TransitionClass;
use super::types::{EntityStateRecord, RawTransitionRequest, Stage, StateName};

/// Answer from the precondition validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionVerdict {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PreconditionVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Everything one workflow run has learned so far.
///
/// Grows stage by stage: the original input, the fetched rider record, the
/// classification, the validator's verdict and which side effects completed.
/// It is the "request context" handed to the validator and is embedded in
/// change events and dead-letter envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub correlation_id: String,
    pub input: RawTransitionRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rider: Option<EntityStateRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<TransitionClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<PreconditionVerdict>,
    #[serde(default)]
    pub persisted: bool,
    #[serde(default)]
    pub notified: bool,
}

impl WorkflowContext {
    pub fn new(correlation_id: impl Into<String>, input: RawTransitionRequest) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            input,
            rider: None,
            class: None,
            validator: None,
            persisted: false,
            notified: false,
        }
    }
}

/// Published after a direct transition has been persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub event_id: Uuid,
    pub entity_id: String,
    pub from_state: StateName,
    pub to_state: StateName,
    pub occurred_at: DateTime<Utc>,
    pub context: WorkflowContext,
}

impl StateChangeEvent {
    pub fn new(
        entity_id: impl Into<String>,
        from_state: StateName,
        to_state: StateName,
        context: WorkflowContext,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            entity_id: entity_id.into(),
            from_state,
            to_state,
            occurred_at: Utc::now(),
            context,
        }
    }
}

/// Payload sent to the dead-letter channel for manual remediation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEnvelope {
    pub id: Uuid,
    pub stage: Stage,
    pub cause: String,
    pub failed_at: DateTime<Utc>,
    /// `context.input` is the original request payload
    pub context: WorkflowContext,
}

impl DeadLetterEnvelope {
    pub fn new(stage: Stage, cause: impl Into<String>, context: WorkflowContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            cause: cause.into(),
            failed_at: Utc::now(),
            context,
        }
    }

    pub fn original_request(&self) -> &RawTransitionRequest {
        &self.context.input
    }
}
