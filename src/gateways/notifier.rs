use async_trait::async_trait;
use tracing::info;

use super::{ChangeNotifier, GatewayError};
use crate::lifecycle::StateChangeEvent;

/// Publishes change events to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl ChangeNotifier for LogNotifier {
    async fn publish(&self, event: &StateChangeEvent) -> Result<(), GatewayError> {
        info!(
            event_id = %event.event_id,
            entity_id = %event.entity_id,
            from = %event.from_state,
            to = %event.to_state,
            "Rider state changed"
        );
        Ok(())
    }
}
