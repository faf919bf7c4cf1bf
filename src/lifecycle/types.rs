// Core types for the rider lifecycle workflow

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operational states a rider moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateName {
    /// Rider is off shift
    #[serde(rename = "Not Working")]
    NotWorking,
    /// Rider is on shift and can be dispatched
    Available,
    /// Rider is heading to the start point of a job
    Starting,
    /// Rider is on a job
    Working,
}

impl StateName {
    /// Closed set of recognized states
    pub const ALL: [StateName; 4] = [
        StateName::NotWorking,
        StateName::Available,
        StateName::Starting,
        StateName::Working,
    ];

    /// Wire name (case-sensitive)
    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::NotWorking => "Not Working",
            StateName::Available => "Available",
            StateName::Starting => "Starting",
            StateName::Working => "Working",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateName {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateName::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| InputError::UnknownState {
                name: s.to_string(),
            })
    }
}

/// Caller-contract violations, rejected before any gateway is touched
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("entity_id must not be empty")]
    EmptyEntityId,

    #[error("unrecognized state '{name}' (expected one of: Not Working, Available, Starting, Working)")]
    UnknownState { name: String },

    #[error("malformed request: {0}")]
    Malformed(String),
}

/// A transition request as received from a caller, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransitionRequest {
    #[serde(default, alias = "rider_id", skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state: Option<String>,
}

impl RawTransitionRequest {
    pub fn new(entity_id: impl Into<String>, next_state: impl Into<String>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            next_state: Some(next_state.into()),
        }
    }

    /// Decode a request from an arbitrary JSON document
    pub fn from_value(value: serde_json::Value) -> Result<Self, InputError> {
        serde_json::from_value(value).map_err(|e| InputError::Malformed(e.to_string()))
    }

    /// Presence and membership checks.
    pub fn validate(&self) -> Result<TransitionRequest, InputError> {
        let entity_id = self
            .entity_id
            .as_deref()
            .ok_or(InputError::MissingField { field: "entity_id" })?;
        let next_state = self
            .next_state
            .as_deref()
            .ok_or(InputError::MissingField { field: "next_state" })?;

        if entity_id.trim().is_empty() {
            return Err(InputError::EmptyEntityId);
        }

        Ok(TransitionRequest {
            entity_id: entity_id.to_string(),
            next_state: next_state.parse()?,
        })
    }
}

/// A structurally valid transition request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub entity_id: String,
    pub next_state: StateName,
}

/// Last known position of a rider. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Persisted state of one rider, keyed by `entity_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStateRecord {
    pub entity_id: String,
    pub current_state: StateName,
    /// Last-modified marker, milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl EntityStateRecord {
    pub fn new(entity_id: impl Into<String>, current_state: StateName) -> Self {
        Self {
            entity_id: entity_id.into(),
            current_state,
            timestamp: Utc::now().timestamp_millis(),
            location: None,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(Location {
            latitude,
            longitude,
        });
        self
    }
}

/// Orchestration stages, used to tag failures for diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Fetch,
    Classify,
    Precondition,
    Persist,
    Notify,
    DeadLetter,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Fetch => "fetch",
            Stage::Classify => "classify",
            Stage::Precondition => "precondition",
            Stage::Persist => "persist",
            Stage::Notify => "notify",
            Stage::DeadLetter => "dead_letter",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one orchestration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Succeeded {
        entity_id: String,
        from_state: StateName,
        to_state: StateName,
    },
    RejectedInvalidInput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<String>,
        reason: String,
    },
    RejectedIllegalTransition {
        entity_id: String,
        from_state: StateName,
        to_state: StateName,
    },
    FailedDeadLettered {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<String>,
        stage: Stage,
        cause: String,
        /// Whether the dead-letter channel acknowledged the payload
        dead_lettered: bool,
    },
}

impl TransitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionOutcome::Succeeded { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransitionOutcome::Succeeded { .. } => "succeeded",
            TransitionOutcome::RejectedInvalidInput { .. } => "rejected_invalid_input",
            TransitionOutcome::RejectedIllegalTransition { .. } => "rejected_illegal_transition",
            TransitionOutcome::FailedDeadLettered { .. } => "failed_dead_lettered",
        }
    }

    /// Stage tag for dead-lettered outcomes
    pub fn stage(&self) -> Option<Stage> {
        match self {
            TransitionOutcome::FailedDeadLettered { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
