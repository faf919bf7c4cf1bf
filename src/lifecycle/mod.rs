// Rider Lifecycle Module - Transition Workflow
//
// Legality table, retry policy and the orchestrator state machine. Gateways
// are injected so the workflow can be exercised without real infrastructure.

pub mod context;
pub mod orchestrator;
pub mod retry;
pub mod table;
pub mod types;


pub use context::{DeadLetterEnvelope, PreconditionVerdict, StateChangeEvent, WorkflowContext};
pub use orchestrator::{Gateways, IllegalTransitionRouting, Orchestrator, OrchestratorSettings};
pub use retry::{BackoffSchedule, RetryError, RetryPolicy};
pub use table::{
    classify, rider_table, TableError, TransitionClass, TransitionRule, TransitionTable,
    WorkflowStep, RIDER_RULES,
};
pub use types::{
    EntityStateRecord, InputError, Location, RawTransitionRequest, Stage, StateName,
    TransitionOutcome, TransitionRequest,
};
