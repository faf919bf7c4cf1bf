use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::lifecycle::{Stage, TransitionOutcome};

/// Transition workflow counters
#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    pub requests: AtomicU64,
    pub succeeded: AtomicU64,
    pub rejected_invalid_input: AtomicU64,
    pub rejected_illegal_transition: AtomicU64,
    pub dead_lettered_fetch: AtomicU64,
    pub dead_lettered_classify: AtomicU64,
    pub dead_lettered_precondition: AtomicU64,
    pub dead_lettered_persist: AtomicU64,
    pub dead_lettered_notify: AtomicU64,
    pub dead_lettered_other: AtomicU64,
    pub dead_letter_failures: AtomicU64,
    pub retries: AtomicU64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter_failure(&self) {
        self.dead_letter_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &TransitionOutcome) {
        let counter = match outcome {
            TransitionOutcome::Succeeded { .. } => &self.succeeded,
            TransitionOutcome::RejectedInvalidInput { .. } => &self.rejected_invalid_input,
            TransitionOutcome::RejectedIllegalTransition { .. } => {
                &self.rejected_illegal_transition
            }
            TransitionOutcome::FailedDeadLettered { stage, .. } => match stage {
                Stage::Fetch => &self.dead_lettered_fetch,
                Stage::Classify => &self.dead_lettered_classify,
                Stage::Precondition => &self.dead_lettered_precondition,
                Stage::Persist => &self.dead_lettered_persist,
                Stage::Notify => &self.dead_lettered_notify,
                Stage::Validate | Stage::DeadLetter => &self.dead_lettered_other,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> WorkflowStats {
        WorkflowStats {
            requests: self.requests.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            rejected_invalid_input: self.rejected_invalid_input.load(Ordering::Relaxed),
            rejected_illegal_transition: self.rejected_illegal_transition.load(Ordering::Relaxed),
            dead_lettered: DeadLetterStats {
                fetch: self.dead_lettered_fetch.load(Ordering::Relaxed),
                classify: self.dead_lettered_classify.load(Ordering::Relaxed),
                precondition: self.dead_lettered_precondition.load(Ordering::Relaxed),
                persist: self.dead_lettered_persist.load(Ordering::Relaxed),
                notify: self.dead_lettered_notify.load(Ordering::Relaxed),
                other: self.dead_lettered_other.load(Ordering::Relaxed),
            },
            dead_letter_failures: self.dead_letter_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            requests = stats.requests,
            succeeded = stats.succeeded,
            rejected_invalid_input = stats.rejected_invalid_input,
            rejected_illegal_transition = stats.rejected_illegal_transition,
            dead_lettered = stats.dead_lettered.total(),
            dead_letter_failures = stats.dead_letter_failures,
            retries = stats.retries,
            "Transition workflow metrics"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetterStats {
    pub fetch: u64,
    pub classify: u64,
    pub precondition: u64,
    pub persist: u64,
    pub notify: u64,
    pub other: u64,
}

impl DeadLetterStats {
    pub fn total(&self) -> u64 {
        self.fetch + self.classify + self.precondition + self.persist + self.notify + self.other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStats {
    pub requests: u64,
    pub succeeded: u64,
    pub rejected_invalid_input: u64,
    pub rejected_illegal_transition: u64,
    pub dead_lettered: DeadLetterStats,
    pub dead_letter_failures: u64,
    pub retries: u64,
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}
