// In-memory gateway adapters with scripted failures
//
// Used by tests and local demos. Each adapter records what it was asked to
// do so callers can assert on side effects.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    ChangeNotifier, DeadLetterSink, GatewayError, PreconditionValidator, StateStore,
};
use crate::lifecycle::{
    DeadLetterEnvelope, EntityStateRecord, PreconditionVerdict, StateChangeEvent, StateName,
    WorkflowContext,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Failures to inject before (or instead of) the normal behaviour
#[derive(Debug, Default)]
pub struct FailureScript {
    queued: VecDeque<GatewayError>,
    always: Option<GatewayError>,
}

impl FailureScript {
    fn next_failure(&mut self) -> Option<GatewayError> {
        self.queued.pop_front().or_else(|| self.always.clone())
    }
}

/// Operations exposed by the state store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Get,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get { entity_id: String },
    Update { entity_id: String, new_state: StateName },
}

/// HashMap-backed state store
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: Mutex<HashMap<String, EntityStateRecord>>,
    failures: Mutex<HashMap<StoreOperation, FailureScript>>,
    calls: Mutex<Vec<StoreCall>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given records
    pub fn with_records(records: impl IntoIterator<Item = EntityStateRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: EntityStateRecord) {
        lock(&self.records).insert(record.entity_id.clone(), record);
    }

    pub fn record(&self, entity_id: &str) -> Option<EntityStateRecord> {
        lock(&self.records).get(entity_id).cloned()
    }

    /// Fail the next calls of `operation` with these errors, in order
    pub fn fail_next(&self, operation: StoreOperation, errors: impl IntoIterator<Item = GatewayError>) {
        lock(&self.failures)
            .entry(operation)
            .or_default()
            .queued
            .extend(errors);
    }

    /// Fail every call of `operation` once queued failures are used up
    pub fn fail_always(&self, operation: StoreOperation, error: GatewayError) {
        lock(&self.failures).entry(operation).or_default().always = Some(error);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, operation: StoreOperation) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| match (call, operation) {
                (StoreCall::Get { .. }, StoreOperation::Get) => true,
                (StoreCall::Update { .. }, StoreOperation::Update) => true,
                _ => false,
            })
            .count()
    }

    fn injected_failure(&self, operation: StoreOperation) -> Option<GatewayError> {
        lock(&self.failures)
            .get_mut(&operation)
            .and_then(FailureScript::next_failure)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, entity_id: &str) -> Result<Option<EntityStateRecord>, GatewayError> {
        lock(&self.calls).push(StoreCall::Get {
            entity_id: entity_id.to_string(),
        });
        if let Some(error) = self.injected_failure(StoreOperation::Get) {
            return Err(error);
        }
        Ok(self.record(entity_id))
    }

    async fn conditional_update(
        &self,
        entity_id: &str,
        new_state: StateName,
    ) -> Result<(), GatewayError> {
        lock(&self.calls).push(StoreCall::Update {
            entity_id: entity_id.to_string(),
            new_state,
        });
        if let Some(error) = self.injected_failure(StoreOperation::Update) {
            return Err(error);
        }

        let mut records = lock(&self.records);
        let record = records
            .entry(entity_id.to_string())
            .or_insert_with(|| EntityStateRecord::new(entity_id, new_state));
        record.current_state = new_state;
        record.timestamp = chrono::Utc::now().timestamp_millis();
        Ok(())
    }
}

/// Validator returning a fixed verdict
#[derive(Debug)]
pub struct StaticValidator {
    verdict: PreconditionVerdict,
    failures: Mutex<FailureScript>,
    seen: Mutex<Vec<WorkflowContext>>,
}

impl StaticValidator {
    pub fn new(verdict: PreconditionVerdict) -> Self {
        Self {
            verdict,
            failures: Mutex::new(FailureScript::default()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn approving() -> Self {
        Self::new(PreconditionVerdict::valid())
    }

    pub fn denying(reason: impl Into<String>) -> Self {
        Self::new(PreconditionVerdict::invalid(reason))
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = GatewayError>) {
        lock(&self.failures).queued.extend(errors);
    }

    pub fn fail_always(&self, error: GatewayError) {
        lock(&self.failures).always = Some(error);
    }

    /// Contexts the validator was called with, one per attempt
    pub fn seen_contexts(&self) -> Vec<WorkflowContext> {
        lock(&self.seen).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.seen).len()
    }
}

#[async_trait]
impl PreconditionValidator for StaticValidator {
    async fn validate(
        &self,
        context: &WorkflowContext,
    ) -> Result<PreconditionVerdict, GatewayError> {
        lock(&self.seen).push(context.clone());
        if let Some(error) = lock(&self.failures).next_failure() {
            return Err(error);
        }
        Ok(self.verdict.clone())
    }
}

/// Notifier that keeps published events in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<StateChangeEvent>>,
    failures: Mutex<FailureScript>,
    attempts: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = GatewayError>) {
        lock(&self.failures).queued.extend(errors);
    }

    pub fn fail_always(&self, error: GatewayError) {
        lock(&self.failures).always = Some(error);
    }

    /// Successfully published events
    pub fn events(&self) -> Vec<StateChangeEvent> {
        lock(&self.events).clone()
    }

    /// Publish calls, including failed ones
    pub fn attempts(&self) -> usize {
        *lock(&self.attempts)
    }
}

#[async_trait]
impl ChangeNotifier for RecordingNotifier {
    async fn publish(&self, event: &StateChangeEvent) -> Result<(), GatewayError> {
        *lock(&self.attempts) += 1;
        if let Some(error) = lock(&self.failures).next_failure() {
            return Err(error);
        }
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

/// Dead-letter sink that keeps envelopes in memory
#[derive(Debug, Default)]
pub struct RecordingDeadLetterSink {
    envelopes: Mutex<Vec<DeadLetterEnvelope>>,
    failures: Mutex<FailureScript>,
    attempts: Mutex<usize>,
}

impl RecordingDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = GatewayError>) {
        lock(&self.failures).queued.extend(errors);
    }

    pub fn fail_always(&self, error: GatewayError) {
        lock(&self.failures).always = Some(error);
    }

    /// Delivered envelopes
    pub fn envelopes(&self) -> Vec<DeadLetterEnvelope> {
        lock(&self.envelopes).clone()
    }

    /// Send calls, including failed ones
    pub fn attempts(&self) -> usize {
        *lock(&self.attempts)
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetterSink {
    async fn send(&self, envelope: &DeadLetterEnvelope) -> Result<(), GatewayError> {
        *lock(&self.attempts) += 1;
        if let Some(error) = lock(&self.failures).next_failure() {
            return Err(error);
        }
        lock(&self.envelopes).push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::Gateway;

    #[tokio::test]
    async fn test_update_creates_missing_record() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.get("r1").await.unwrap(), None);

        store
            .conditional_update("r1", StateName::Available)
            .await
            .unwrap();

        let record = store.get("r1").await.unwrap().unwrap();
        assert_eq!(record.current_state, StateName::Available);
        assert_eq!(store.call_count(StoreOperation::Get), 2);
        assert_eq!(store.call_count(StoreOperation::Update), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_location() {
        let store = InMemoryStateStore::with_records([
            EntityStateRecord::new("r1", StateName::Starting).with_location(52.5, 13.4)
        ]);

        store
            .conditional_update("r1", StateName::Working)
            .await
            .unwrap();

        let record = store.record("r1").unwrap();
        assert_eq!(record.current_state, StateName::Working);
        assert!(record.location.is_some());
    }

    #[tokio::test]
    async fn test_queued_failures_are_consumed_in_order() {
        let store = InMemoryStateStore::new();
        store.fail_next(
            StoreOperation::Get,
            [
                GatewayError::unavailable(Gateway::StateStore, "first"),
                GatewayError::Throttled {
                    gateway: Gateway::StateStore,
                },
            ],
        );

        assert!(matches!(
            store.get("r1").await,
            Err(GatewayError::Unavailable { .. })
        ));
        assert!(matches!(
            store.get("r1").await,
            Err(GatewayError::Throttled { .. })
        ));
        assert_eq!(store.get("r1").await, Ok(None));
    }
}
