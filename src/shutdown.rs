use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Graceful shutdown flag shared by long-running commands.
///
/// Cloning shares the flag. Once triggered it stays triggered.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signal that is triggered by the first Ctrl-C
    pub fn install_ctrl_c() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C, finishing in-flight transitions");
                    trigger.trigger();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });

        signal
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the signal has been triggered
    pub async fn triggered(&self) {
        let mut receiver = self.receiver.clone();
        // Err only when every sender is gone; we hold one
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }
}
