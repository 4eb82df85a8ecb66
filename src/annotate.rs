use std::sync::Arc;

use crate::gateway::{ChatGateway, Marker};
use crate::report::Reporter;

/// Applies and removes outcome markers on fragment messages.
///
/// Annotation is a diagnostic aid for the fragment's author, never a
/// control-flow gate: failures are reported and otherwise ignored.
#[derive(Clone)]
pub struct Annotator {
    gateway: Arc<dyn ChatGateway>,
    reporter: Reporter,
}

impl Annotator {
    pub fn new(gateway: Arc<dyn ChatGateway>, reporter: Reporter) -> Self {
        Self { gateway, reporter }
    }

    pub async fn try_add(&self, channel_id: &str, message_id: &str, marker: Marker) {
        if let Err(e) = self.gateway.add_reaction(channel_id, message_id, marker).await {
            self.reporter
                .report(
                    &format!("failed to add {} to {}", marker, message_id),
                    &e,
                )
                .await;
        }
    }

    pub async fn try_remove(&self, channel_id: &str, message_id: &str, marker: Marker) {
        if let Err(e) = self
            .gateway
            .remove_reaction(channel_id, message_id, marker)
            .await
        {
            self.reporter
                .report(
                    &format!("failed to remove {} from {}", marker, message_id),
                    &e,
                )
                .await;
        }
    }

    /// Marks a fragment's outcome: the matching marker is ensured present,
    /// the opposite one ensured absent. Two independent best-effort
    /// operations.
    pub async fn mark_outcome(&self, channel_id: &str, message_id: &str, success: bool) {
        let (add, remove) = if success {
            (Marker::Success, Marker::Failure)
        } else {
            (Marker::Failure, Marker::Success)
        };
        self.try_add(channel_id, message_id, add).await;
        self.try_remove(channel_id, message_id, remove).await;
    }
}
