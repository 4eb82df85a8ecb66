use core::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::gateway::{ChannelId, ChatGateway};

/// Forwards failure descriptions to the operator channel.
///
/// Reporting is diagnostic only: a report that cannot be delivered is
/// logged and dropped, never propagated.
#[derive(Clone)]
pub struct Reporter {
    gateway: Arc<dyn ChatGateway>,
    log_channel: ChannelId,
}

impl Reporter {
    pub fn new(gateway: Arc<dyn ChatGateway>, log_channel: ChannelId) -> Self {
        Self {
            gateway,
            log_channel,
        }
    }

    pub async fn report<E: fmt::Display>(&self, description: &str, error: &E) {
        warn!("{}: {}", description, error);
        let text = format!("{}: {}", description, error);
        if let Err(e) = self.gateway.send_message(&self.log_channel, &text).await {
            warn!("failed to deliver error report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, MockChatGateway};
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_report_goes_to_log_channel() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_send_message()
            .with(eq("log"), eq("evaluating m1: boom"))
            .times(1)
            .returning(|_, _| Ok(()));
        let reporter = Reporter::new(Arc::new(gateway), "log".to_string());
        reporter.report("evaluating m1", &"boom").await;
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_send_message()
            .returning(|_, _| Err(GatewayError::Send("down".to_string())));
        let reporter = Reporter::new(Arc::new(gateway), "log".to_string());
        // must not panic or propagate
        reporter.report("evaluating m1", &"boom").await;
    }
}
