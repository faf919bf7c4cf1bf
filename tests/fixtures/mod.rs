//! Shared in-memory gateway fixtures for workflow tests
#![allow(dead_code)]

use rider_state::gateways::{
    InMemoryStateStore, LocationValidator, PreconditionValidator, RecordingDeadLetterSink,
    RecordingNotifier, StaticValidator,
};
use rider_state::lifecycle::{
    EntityStateRecord, Gateways, Orchestrator, OrchestratorSettings, RetryPolicy, StateName,
};
use std::sync::Arc;
use std::time::Duration;

/// In-memory gateways plus handles for inspecting their side effects
pub struct TestGateways {
    pub store: Arc<InMemoryStateStore>,
    pub validator: Arc<dyn PreconditionValidator>,
    pub notifier: Arc<RecordingNotifier>,
    pub dead_letter: Arc<RecordingDeadLetterSink>,
}

impl TestGateways {
    /// Gateways that check rider locations like the real validator
    pub fn new() -> Self {
        Self::with_validator(Arc::new(LocationValidator::new()))
    }

    pub fn with_validator(validator: Arc<dyn PreconditionValidator>) -> Self {
        Self {
            store: Arc::new(InMemoryStateStore::new()),
            validator,
            notifier: Arc::new(RecordingNotifier::new()),
            dead_letter: Arc::new(RecordingDeadLetterSink::new()),
        }
    }

    pub fn approving() -> Self {
        Self::with_validator(Arc::new(StaticValidator::approving()))
    }

    pub fn seed(&self, entity_id: &str, state: StateName) -> &Self {
        self.store.insert(EntityStateRecord::new(entity_id, state));
        self
    }

    pub fn seed_at(&self, entity_id: &str, state: StateName, lat: f64, long: f64) -> &Self {
        self.store
            .insert(EntityStateRecord::new(entity_id, state).with_location(lat, long));
        self
    }

    pub fn state_of(&self, entity_id: &str) -> Option<StateName> {
        self.store.record(entity_id).map(|record| record.current_state)
    }

    pub fn gateways(&self) -> Gateways {
        Gateways {
            store: self.store.clone(),
            validator: self.validator.clone(),
            notifier: self.notifier.clone(),
            dead_letter: self.dead_letter.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(OrchestratorSettings::default())
    }

    pub fn orchestrator_with(&self, settings: OrchestratorSettings) -> Orchestrator {
        Orchestrator::new(self.gateways(), settings)
    }
}

/// Default policy shape with millisecond backoff, for tests on a real clock
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        fetch_retry: RetryPolicy::new(3, Duration::from_millis(1), 1.5),
        stage_retry: RetryPolicy::new(5, Duration::from_millis(1), 1.5),
        ..OrchestratorSettings::default()
    }
}
