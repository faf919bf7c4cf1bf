use async_trait::async_trait;
use tracing::debug;

use super::{GatewayError, PreconditionValidator};
use crate::lifecycle::{PreconditionVerdict, WorkflowContext};

/// Checks the rider's last known position before a job starts.
///
/// A position is acceptable when both coordinates are non-negative. Riders
/// without a stored position fail the check.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationValidator;

impl LocationValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(context: &WorkflowContext) -> PreconditionVerdict {
        let Some(location) = context.rider.as_ref().and_then(|rider| rider.location) else {
            return PreconditionVerdict::invalid("rider has no known location");
        };

        if location.latitude >= 0.0 && location.longitude >= 0.0 {
            PreconditionVerdict::valid()
        } else {
            PreconditionVerdict::invalid(format!(
                "location ({}, {}) is outside the service area",
                location.latitude, location.longitude
            ))
        }
    }
}

#[async_trait]
impl PreconditionValidator for LocationValidator {
    async fn validate(
        &self,
        context: &WorkflowContext,
    ) -> Result<PreconditionVerdict, GatewayError> {
        let verdict = Self::check(context);
        debug!(valid = verdict.valid, "Location check");
        Ok(verdict)
    }
}
