#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use saisei::config::SystemConfig;
use saisei::gateway::{
    ChatGateway, GatewayEvent, GatewayResult, InboundMessage, Marker,
};
use saisei::system::System;

/// Recording in-memory transport. History is seeded per channel; reactions
/// and sends are captured so tests can assert on annotation state and
/// handler output.
#[derive(Default)]
pub struct FakeGateway {
    history: Mutex<HashMap<String, Vec<InboundMessage>>>,
    reactions: Mutex<HashMap<String, HashSet<String>>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_history(&self, channel_id: &str, messages: Vec<InboundMessage>) {
        self.history
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), messages);
    }

    pub fn has_reaction(&self, message_id: &str, marker: Marker) -> bool {
        self.reactions
            .lock()
            .unwrap()
            .get(message_id)
            .is_some_and(|markers| markers.contains(&marker.to_string()))
    }

    pub fn reactions_of(&self, message_id: &str) -> HashSet<String> {
        self.reactions
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn sent_to(&self, channel_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(channel, _)| channel == channel_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatGateway for FakeGateway {
    async fn history(&self, channel_id: &str, limit: usize) -> GatewayResult<Vec<InboundMessage>> {
        let history = self.history.lock().unwrap();
        let messages = history.get(channel_id).cloned().unwrap_or_default();
        // oldest first, most recent `limit`
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn add_reaction(
        &self,
        _channel_id: &str,
        message_id: &str,
        marker: Marker,
    ) -> GatewayResult<()> {
        self.reactions
            .lock()
            .unwrap()
            .entry(message_id.to_string())
            .or_default()
            .insert(marker.to_string());
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel_id: &str,
        message_id: &str,
        marker: Marker,
    ) -> GatewayResult<()> {
        if let Some(markers) = self.reactions.lock().unwrap().get_mut(message_id) {
            markers.remove(&marker.to_string());
        }
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> GatewayResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub const CODE_CHANNEL: &str = "code";
pub const LOG_CHANNEL: &str = "log";

pub fn test_config() -> SystemConfig {
    SystemConfig {
        trusted_authors: vec!["alice".to_string(), "bob".to_string()],
        code_channels: vec![CODE_CHANNEL.to_string()],
        log_channel: LOG_CHANNEL.to_string(),
        self_id: "saisei-bot".to_string(),
        ..Default::default()
    }
}

pub fn started_system(gateway: Arc<FakeGateway>) -> System {
    System::new(test_config(), gateway).unwrap()
}

pub fn code_message(id: &str, author: &str, code: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        author_id: author.to_string(),
        channel_id: CODE_CHANNEL.to_string(),
        content: format!("```sai\n{}\n```", code),
        is_self: false,
    }
}

pub fn plain_message(id: &str, author: &str, channel_id: &str, content: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        author_id: author.to_string(),
        channel_id: channel_id.to_string(),
        content: content.to_string(),
        is_self: false,
    }
}

pub fn created(message: InboundMessage) -> GatewayEvent {
    GatewayEvent::MessageCreate(message)
}

pub fn updated(message: InboundMessage) -> GatewayEvent {
    GatewayEvent::MessageUpdate(message)
}

pub fn deleted(id: &str) -> GatewayEvent {
    GatewayEvent::MessageDelete {
        id: id.to_string(),
        channel_id: CODE_CHANNEL.to_string(),
    }
}

/// Annotations and reports are fire-and-forget tasks; give them a moment to
/// land before asserting on gateway state.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
