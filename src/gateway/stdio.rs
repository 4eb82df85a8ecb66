//! Line-delimited JSON transport for local development.
//!
//! Inbound events are read from stdin, one [`GatewayEvent`] JSON object per
//! line. Outbound operations are written to stdout as one JSON object per
//! line with an `op` discriminator, so a wrapping process (or a human with a
//! terminal) can observe reactions and sends.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ChatGateway, GatewayEvent, GatewayResult, InboundMessage, Marker};

pub struct StdioGateway;

impl StdioGateway {
    /// Builds the gateway and spawns the stdin reader. Returns the gateway
    /// and the event intake the system run loop consumes. The reader thread
    /// stops at EOF, closing the intake.
    pub fn channel(buffer: usize) -> (Arc<Self>, mpsc::Receiver<GatewayEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match std::io::BufRead::read_line(&mut stdin.lock(), &mut line) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                }
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<GatewayEvent>(trimmed) {
                    Ok(event) => {
                        if tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("ignoring undecodable event line: {}", e),
                }
            }
            debug!("stdin reader finished");
        });
        (Arc::new(Self), rx)
    }

    fn emit(&self, payload: serde_json::Value) {
        println!("{}", payload);
    }
}

#[async_trait]
impl ChatGateway for StdioGateway {
    async fn history(&self, channel_id: &str, _limit: usize) -> GatewayResult<Vec<InboundMessage>> {
        // A fresh stdio session has no backlog.
        debug!(channel_id, "stdio gateway has no history");
        Ok(Vec::new())
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        marker: Marker,
    ) -> GatewayResult<()> {
        self.emit(json!({
            "op": "add_reaction",
            "channel_id": channel_id,
            "message_id": message_id,
            "marker": marker.to_string(),
        }));
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        marker: Marker,
    ) -> GatewayResult<()> {
        self.emit(json!({
            "op": "remove_reaction",
            "channel_id": channel_id,
            "message_id": message_id,
            "marker": marker.to_string(),
        }));
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> GatewayResult<()> {
        self.emit(json!({
            "op": "send_message",
            "channel_id": channel_id,
            "text": text,
        }));
        Ok(())
    }
}
