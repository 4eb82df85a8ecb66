//! Handler registry and event routing.
//!
//! Fragments register handlers while they are evaluated; routed messages
//! are dispatched to every registered handler in registration order. The
//! registry is rebuilt from scratch on every refresh cycle, so only
//! handlers belonging to currently present fragments are ever invoked.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::ast::{Block, EventSelector};
use crate::capability::{CapabilityResolver, NativeFunction};
use crate::eval::context::{EventBinding, ExecutionContext};
use crate::eval::expression::Value;
use crate::eval::Evaluator;
use crate::gateway::{ChatGateway, InboundMessage, MessageId};
use crate::report::Reporter;

/// Environment a handler saw when it was registered: visible locals and
/// capability-bound functions. Dispatches run against a copy of this.
#[derive(Clone, Default)]
pub struct CapturedEnv {
    pub locals: HashMap<String, Value>,
    pub functions: HashMap<String, NativeFunction>,
}

#[derive(Clone)]
pub struct RegisteredHandler {
    pub fragment_id: MessageId,
    pub selector: EventSelector,
    pub block: Block,
    pub captured: CapturedEnv,
}

/// Ordered handler collection, rebuilt each refresh cycle.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    pub async fn clear(&self) {
        self.handlers.write().await.clear();
    }

    pub async fn push(&self, handler: RegisteredHandler) {
        self.handlers.write().await.push(handler);
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    /// Owned copy in registration order; dispatch iterates a snapshot so a
    /// handler mutating the registry mid-dispatch cannot affect the current
    /// round.
    pub async fn snapshot(&self) -> Vec<RegisteredHandler> {
        self.handlers.read().await.clone()
    }

    /// Fragment ids owning the current handlers, in order. Test and
    /// inspection aid.
    pub async fn owners(&self) -> Vec<MessageId> {
        self.handlers
            .read()
            .await
            .iter()
            .map(|handler| handler.fragment_id.clone())
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("capability {name} installed; restart required")]
    RestartRequired { name: String },
}

pub type RouterResult<T> = Result<T, RouterError>;

/// Dispatches routed messages to every registered handler, isolating
/// per-handler failures.
pub struct EventRouter {
    registry: Arc<HandlerRegistry>,
    shared: Arc<DashMap<String, Value>>,
    resolver: Arc<CapabilityResolver>,
    gateway: Arc<dyn ChatGateway>,
    evaluator: Arc<Evaluator>,
    reporter: Reporter,
}

impl EventRouter {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        shared: Arc<DashMap<String, Value>>,
        resolver: Arc<CapabilityResolver>,
        gateway: Arc<dyn ChatGateway>,
        evaluator: Arc<Evaluator>,
        reporter: Reporter,
    ) -> Self {
        Self {
            registry,
            shared,
            resolver,
            gateway,
            evaluator,
            reporter,
        }
    }

    pub async fn dispatch(&self, message: &InboundMessage) -> RouterResult<()> {
        let snapshot = self.registry.snapshot().await;
        debug!(
            message_id = %message.id,
            handlers = snapshot.len(),
            "dispatching message"
        );

        for handler in snapshot {
            if handler.selector != EventSelector::Message {
                continue;
            }
            let context = Arc::new(ExecutionContext::for_handler(
                &handler,
                self.shared.clone(),
                self.registry.clone(),
                self.resolver.clone(),
                self.gateway.clone(),
                EventBinding::from(message),
            ));
            if let Err(e) = self.evaluator.eval_block(&handler.block, context).await {
                if let Some(name) = e.restart_required() {
                    return Err(RouterError::RestartRequired {
                        name: name.to_string(),
                    });
                }
                self.reporter
                    .report(
                        &format!(
                            "error processing message {} in handler from fragment {}",
                            message.id, handler.fragment_id
                        ),
                        &e,
                    )
                    .await;
            }
        }
        Ok(())
    }
}
