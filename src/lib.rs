// Rider State Library - Rider Lifecycle Transition Orchestration
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod database;
pub mod gateways;
pub mod lifecycle;
pub mod observability;
pub mod shutdown;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, RiderStateConfig};
#[cfg(feature = "database")]
pub use database::SqliteStateStore;
pub use gateways::{
    ChangeNotifier, DeadLetterSink, Gateway, GatewayError, PreconditionValidator, StateStore,
};
pub use lifecycle::{
    classify, DeadLetterEnvelope, EntityStateRecord, Gateways, IllegalTransitionRouting,
    InputError, Orchestrator, OrchestratorSettings, RawTransitionRequest, RetryPolicy, Stage,
    StateChangeEvent, StateName, TransitionClass, TransitionOutcome, WorkflowContext,
};
pub use observability::{OperationTimer, WorkflowMetrics, WorkflowStats};
pub use shutdown::ShutdownSignal;
pub use telemetry::{create_command_span, generate_correlation_id, init_telemetry};
