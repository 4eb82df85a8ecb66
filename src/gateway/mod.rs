//! # Messaging Gateway Boundary
//!
//! The engine never talks to a chat transport directly. Everything it needs
//! from the outside world goes through [`ChatGateway`]: history backfill,
//! reaction markers, and outbound text. Inbound traffic arrives as
//! [`GatewayEvent`] values on an mpsc channel owned by the transport adapter.
//!
//! Production transports implement the trait out of tree; [`stdio`] ships a
//! line-delimited JSON adapter for local development.

pub mod stdio;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type MessageId = String;
pub type ChannelId = String;
pub type AuthorId = String;

/// One message as the transport reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub author_id: AuthorId,
    pub channel_id: ChannelId,
    pub content: String,
    /// Set by the transport when the message was sent by this process's
    /// own identity.
    #[serde(default)]
    pub is_self: bool,
}

/// Inbound notifications, delivered one at a time in transport order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayEvent {
    MessageCreate(InboundMessage),
    MessageUpdate(InboundMessage),
    MessageDelete {
        id: MessageId,
        channel_id: ChannelId,
    },
}

/// Reaction markers used to annotate fragment outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Marker {
    #[strum(serialize = "✅")]
    Success,
    #[strum(serialize = "❌")]
    Failure,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("history fetch failed: {0}")]
    History(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("reaction update failed: {0}")]
    Reaction(String),

    #[error("gateway closed")]
    Closed,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Outbound operations the engine may request from the transport.
///
/// All operations are best-effort from the engine's point of view; the
/// callers decide whether a failure is reported or fatal.
#[automock]
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Fetches up to `limit` most recent messages, oldest first.
    async fn history(&self, channel_id: &str, limit: usize) -> GatewayResult<Vec<InboundMessage>>;

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        marker: Marker,
    ) -> GatewayResult<()>;

    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        marker: Marker,
    ) -> GatewayResult<()>;

    async fn send_message(&self, channel_id: &str, text: &str) -> GatewayResult<()>;
}
