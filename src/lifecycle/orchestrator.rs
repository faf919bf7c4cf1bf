// Transition orchestrator
//
// Drives one request from raw input to exactly one terminal outcome. The
// workflow is an explicit state machine: `Phase` enumerates the orchestration
// stages and `advance` is the transition function. Retry, stage tagging and
// dead-letter routing are applied uniformly in `advance`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use super::context::{DeadLetterEnvelope, StateChangeEvent, WorkflowContext};
use super::retry::{RetryError, RetryPolicy};
use super::table::{rider_table, TransitionClass, TransitionTable, WorkflowStep};
use super::types::{
    EntityStateRecord, RawTransitionRequest, Stage, StateName, TransitionOutcome,
    TransitionRequest,
};
use crate::gateways::{ChangeNotifier, DeadLetterSink, PreconditionValidator, StateStore};
use crate::observability::{OperationTimer, WorkflowMetrics};
use crate::telemetry::generate_correlation_id;

/// What happens to requests whose transition is not in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IllegalTransitionRouting {
    /// Dead-letter and fail with stage `classify`
    #[default]
    DeadLetter,
    /// Return `RejectedIllegalTransition` without dead-lettering
    Reject,
}

/// Tunables for one orchestrator instance
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub fetch_retry: RetryPolicy,
    pub stage_retry: RetryPolicy,
    /// Host-level limit on one run, excluding the dead-letter stage
    pub deadline: Option<Duration>,
    pub illegal_transition_routing: IllegalTransitionRouting,
    /// State assumed for riders the store has never seen
    pub unknown_entity_state: Option<StateName>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            fetch_retry: RetryPolicy::with_attempts(3),
            stage_retry: RetryPolicy::with_attempts(5),
            deadline: Some(Duration::from_secs(300)),
            illegal_transition_routing: IllegalTransitionRouting::DeadLetter,
            unknown_entity_state: Some(StateName::NotWorking),
        }
    }
}

/// The four collaborators the workflow talks to
#[derive(Clone)]
pub struct Gateways {
    pub store: Arc<dyn StateStore>,
    pub validator: Arc<dyn PreconditionValidator>,
    pub notifier: Arc<dyn ChangeNotifier>,
    pub dead_letter: Arc<dyn DeadLetterSink>,
}

/// Orchestration stages. Entity states live in `StateName`.
#[derive(Debug, Clone, PartialEq)]
enum Phase {
    ValidateInput,
    FetchCurrent {
        request: TransitionRequest,
    },
    Classify {
        request: TransitionRequest,
        current: StateName,
    },
    Execute {
        request: TransitionRequest,
        from: StateName,
        class: TransitionClass,
        step: usize,
    },
    DeadLetter {
        stage: Stage,
        cause: String,
    },
    Done(TransitionOutcome),
}

impl Phase {
    fn stage(&self) -> Stage {
        match self {
            Phase::ValidateInput => Stage::Validate,
            Phase::FetchCurrent { .. } => Stage::Fetch,
            Phase::Classify { .. } => Stage::Classify,
            Phase::Execute { class, step, .. } => {
                // Past the end the run is still tagged with its last step
                let steps = class.steps();
                steps
                    .get(*step)
                    .or_else(|| steps.last())
                    .map_or(Stage::Classify, WorkflowStep::stage)
            }
            Phase::DeadLetter { .. } | Phase::Done(_) => Stage::DeadLetter,
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, Phase::DeadLetter { .. } | Phase::Done(_))
    }
}

/// Mutable state of one run
struct WorkflowRun {
    context: WorkflowContext,
    stage: Stage,
}

#[derive(Clone)]
pub struct Orchestrator {
    gateways: Gateways,
    settings: OrchestratorSettings,
    table: &'static TransitionTable,
    metrics: Arc<WorkflowMetrics>,
}

impl Orchestrator {
    pub fn new(gateways: Gateways, settings: OrchestratorSettings) -> Self {
        Self {
            gateways,
            settings,
            table: rider_table(),
            metrics: Arc::new(WorkflowMetrics::new()),
        }
    }

    /// Share a metrics sink across orchestrators
    pub fn with_metrics(mut self, metrics: Arc<WorkflowMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<WorkflowMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Decode and run a request given as JSON.
    pub async fn run_value(&self, value: serde_json::Value) -> TransitionOutcome {
        match RawTransitionRequest::from_value(value) {
            Ok(raw) => self.run(raw).await,
            Err(e) => {
                let outcome = TransitionOutcome::RejectedInvalidInput {
                    entity_id: None,
                    reason: e.to_string(),
                };
                self.metrics.record_request();
                self.metrics.record_outcome(&outcome);
                outcome
            }
        }
    }

    /// Process one request to its terminal outcome.
    pub async fn run(&self, raw: RawTransitionRequest) -> TransitionOutcome {
        let correlation_id = generate_correlation_id();
        let span = tracing::info_span!(
            "rider_transition",
            correlation.id = %correlation_id,
            entity.id = raw.entity_id.as_deref().unwrap_or(""),
            next_state = raw.next_state.as_deref().unwrap_or(""),
        );

        async move {
            let timer = OperationTimer::new("rider_transition");
            self.metrics.record_request();

            let mut run = WorkflowRun {
                context: WorkflowContext::new(correlation_id, raw),
                stage: Stage::Validate,
            };

            let settled = match self.settings.deadline {
                Some(deadline) => {
                    let driven = tokio::time::timeout(deadline, self.drive(&mut run)).await;
                    match driven {
                        Ok(phase) => phase,
                        Err(_) => {
                            error!(
                                stage = %run.stage,
                                deadline_ms = deadline.as_millis() as u64,
                                "Workflow deadline exceeded"
                            );
                            Phase::DeadLetter {
                                stage: run.stage,
                                cause: format!(
                                    "workflow deadline of {}ms exceeded",
                                    deadline.as_millis()
                                ),
                            }
                        }
                    }
                }
                None => self.drive(&mut run).await,
            };

            let mut phase = settled;
            while !matches!(phase, Phase::Done(_)) {
                phase = self.advance(phase, &mut run).await;
            }

            let Phase::Done(outcome) = phase else {
                unreachable!("loop exits only on Done")
            };

            self.metrics.record_outcome(&outcome);
            info!(outcome = outcome.kind(), stage = ?outcome.stage(), "Transition workflow finished");
            timer.finish();
            outcome
        }
        .instrument(span)
        .await
    }

    /// Advance until the run either finishes or needs dead-lettering.
    async fn drive(&self, run: &mut WorkflowRun) -> Phase {
        let mut phase = Phase::ValidateInput;
        while !phase.is_settled() {
            phase = self.advance(phase, run).await;
        }
        phase
    }

    /// Transition function of the workflow state machine.
    async fn advance(&self, phase: Phase, run: &mut WorkflowRun) -> Phase {
        run.stage = phase.stage();

        match phase {
            Phase::ValidateInput => match run.context.input.validate() {
                Ok(request) => Phase::FetchCurrent { request },
                Err(e) => {
                    info!(reason = %e, "Rejected invalid transition request");
                    Phase::Done(TransitionOutcome::RejectedInvalidInput {
                        entity_id: run.context.input.entity_id.clone(),
                        reason: e.to_string(),
                    })
                }
            },

            Phase::FetchCurrent { request } => self.fetch_current(request, run).await,

            Phase::Classify { request, current } => {
                let class = self.table.classify(current, request.next_state);
                run.context.class = Some(class);
                debug!(from = %current, to = %request.next_state, class = %class, "Classified transition");

                match (class, self.settings.illegal_transition_routing) {
                    (TransitionClass::Illegal, IllegalTransitionRouting::DeadLetter) => {
                        Phase::DeadLetter {
                            stage: Stage::Classify,
                            cause: format!(
                                "illegal transition {} -> {}",
                                current, request.next_state
                            ),
                        }
                    }
                    (TransitionClass::Illegal, IllegalTransitionRouting::Reject) => {
                        Phase::Done(TransitionOutcome::RejectedIllegalTransition {
                            entity_id: request.entity_id,
                            from_state: current,
                            to_state: request.next_state,
                        })
                    }
                    (class, _) => Phase::Execute {
                        request,
                        from: current,
                        class,
                        step: 0,
                    },
                }
            }

            Phase::Execute {
                request,
                from,
                class,
                step,
            } => {
                let Some(current_step) = class.steps().get(step).copied() else {
                    return Phase::Done(TransitionOutcome::Succeeded {
                        entity_id: request.entity_id,
                        from_state: from,
                        to_state: request.next_state,
                    });
                };

                match self.execute_step(current_step, &request, from, run).await {
                    Ok(()) => Phase::Execute {
                        request,
                        from,
                        class,
                        step: step + 1,
                    },
                    Err(cause) => Phase::DeadLetter {
                        stage: current_step.stage(),
                        cause,
                    },
                }
            }

            Phase::DeadLetter { stage, cause } => {
                let dead_lettered = self.dead_letter(stage, &cause, run).await;
                Phase::Done(TransitionOutcome::FailedDeadLettered {
                    entity_id: run.context.input.entity_id.clone(),
                    stage,
                    cause,
                    dead_lettered,
                })
            }

            done @ Phase::Done(_) => done,
        }
    }

    async fn fetch_current(&self, request: TransitionRequest, run: &mut WorkflowRun) -> Phase {
        let store = &self.gateways.store;
        let entity_id = request.entity_id.as_str();

        let fetched = self
            .settings
            .fetch_retry
            .retry_with(Stage::Fetch, || store.get(entity_id), |_, _| {
                self.metrics.record_retry()
            })
            .await;

        let record = match fetched {
            Ok(Some(record)) => record,
            Ok(None) => match self.settings.unknown_entity_state {
                Some(initial) => {
                    info!(initial_state = %initial, "Rider not found, assuming initial state");
                    EntityStateRecord::new(entity_id, initial)
                }
                None => {
                    return Phase::DeadLetter {
                        stage: Stage::Fetch,
                        cause: format!("rider '{entity_id}' not found"),
                    }
                }
            },
            Err(e) => {
                return Phase::DeadLetter {
                    stage: Stage::Fetch,
                    cause: e.to_string(),
                }
            }
        };

        let current = record.current_state;
        run.context.rider = Some(record);
        Phase::Classify { request, current }
    }

    /// Run one side-effecting step with the stage's retry policy.
    /// `Err` carries the dead-letter cause.
    async fn execute_step(
        &self,
        step: WorkflowStep,
        request: &TransitionRequest,
        from: StateName,
        run: &mut WorkflowRun,
    ) -> Result<(), String> {
        let stage = step.stage();
        let policy = &self.settings.stage_retry;
        let on_retry = |_: u32, _: &crate::gateways::GatewayError| self.metrics.record_retry();

        match step {
            WorkflowStep::Precondition => {
                let validator = &self.gateways.validator;
                let context = &run.context;
                let verdict = policy
                    .retry_with(stage, || validator.validate(context), on_retry)
                    .await
                    .map_err(|e| describe(&e))?;

                let valid = verdict.valid;
                let reason = verdict.reason.clone();
                run.context.validator = Some(verdict);

                if !valid {
                    let reason = reason.unwrap_or_else(|| "no reason given".to_string());
                    warn!(reason = %reason, "Precondition not met");
                    return Err(format!("precondition not met: {reason}"));
                }
                debug!("Precondition satisfied");
            }

            WorkflowStep::Persist => {
                let store = &self.gateways.store;
                let entity_id = request.entity_id.as_str();
                let next_state = request.next_state;
                policy
                    .retry_with(
                        stage,
                        || store.conditional_update(entity_id, next_state),
                        on_retry,
                    )
                    .await
                    .map_err(|e| describe(&e))?;

                run.context.persisted = true;
                info!(from = %from, to = %next_state, "Persisted rider state");
            }

            WorkflowStep::Notify => {
                let notifier = &self.gateways.notifier;
                let event = StateChangeEvent::new(
                    request.entity_id.clone(),
                    from,
                    request.next_state,
                    run.context.clone(),
                );
                policy
                    .retry_with(stage, || notifier.publish(&event), on_retry)
                    .await
                    .map_err(|e| describe(&e))?;

                run.context.notified = true;
                debug!(event_id = %event.event_id, "Published state change event");
            }
        }

        Ok(())
    }

    /// Best-effort delivery to the dead-letter channel.
    /// Returns whether the channel acknowledged the envelope.
    async fn dead_letter(&self, stage: Stage, cause: &str, run: &WorkflowRun) -> bool {
        error!(stage = %stage, cause = %cause, "Routing request to dead-letter channel");

        let sink = &self.gateways.dead_letter;
        let envelope = DeadLetterEnvelope::new(stage, cause, run.context.clone());
        let delivered = self
            .settings
            .stage_retry
            .retry_with(Stage::DeadLetter, || sink.send(&envelope), |_, _| {
                self.metrics.record_retry()
            })
            .await;

        match delivered {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_dead_letter_failure();
                error!(
                    envelope_id = %envelope.id,
                    error = %e,
                    "Dead-letter delivery failed; request is only recorded in logs"
                );
                false
            }
        }
    }
}

fn describe(error: &RetryError) -> String {
    match error {
        RetryError::Exhausted { attempts, last, .. } => {
            format!("{last} (gave up after {attempts} attempts)")
        }
        RetryError::NonRetryable { source, .. } => source.to_string(),
    }
}
