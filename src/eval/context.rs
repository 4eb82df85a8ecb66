use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use super::evaluator::{EvalError, EvalResult};
use super::expression::Value;
use crate::ast::{Block, EventSelector};
use crate::capability::{CapabilityHandle, CapabilityResolver, NativeFunction};
use crate::gateway::{AuthorId, ChannelId, ChatGateway, InboundMessage, MessageId};
use crate::router::{CapturedEnv, HandlerRegistry, RegisteredHandler};

/// The routed message a handler body runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBinding {
    pub content: String,
    pub author: AuthorId,
    pub channel: ChannelId,
}

impl From<&InboundMessage> for EventBinding {
    fn from(message: &InboundMessage) -> Self {
        Self {
            content: message.content.clone(),
            author: message.author_id.clone(),
            channel: message.channel_id.clone(),
        }
    }
}

/// Everything one evaluation can reach.
///
/// The shared namespace is process-wide and survives refresh cycles: the
/// map object itself is never recreated, only re-populated by whichever
/// fragments write to it. Scopes, bound functions and the event binding are
/// per-evaluation and die with the context.
pub struct ExecutionContext {
    shared: Arc<DashMap<String, Value>>,
    scopes: RwLock<ScopeStack>,
    functions: RwLock<HashMap<String, NativeFunction>>,
    registry: Arc<HandlerRegistry>,
    resolver: Arc<CapabilityResolver>,
    gateway: Arc<dyn ChatGateway>,
    fragment_id: MessageId,
    event: Option<EventBinding>,
}

impl ExecutionContext {
    /// Context for evaluating a fragment's code blocks during a refresh.
    pub fn for_fragment(
        shared: Arc<DashMap<String, Value>>,
        registry: Arc<HandlerRegistry>,
        resolver: Arc<CapabilityResolver>,
        gateway: Arc<dyn ChatGateway>,
        fragment_id: MessageId,
    ) -> Self {
        Self {
            shared,
            scopes: RwLock::new(ScopeStack::new()),
            functions: RwLock::new(HashMap::new()),
            registry,
            resolver,
            gateway,
            fragment_id,
            event: None,
        }
    }

    /// Context for running a registered handler against a routed message.
    /// The handler's captured locals and capability functions form the base
    /// environment; the event fields are bound on top of them.
    pub fn for_handler(
        handler: &RegisteredHandler,
        shared: Arc<DashMap<String, Value>>,
        registry: Arc<HandlerRegistry>,
        resolver: Arc<CapabilityResolver>,
        gateway: Arc<dyn ChatGateway>,
        event: EventBinding,
    ) -> Self {
        let mut scopes = ScopeStack::with_base(handler.captured.locals.clone());
        scopes.define("content".to_string(), Value::String(event.content.clone()));
        scopes.define("author".to_string(), Value::String(event.author.clone()));
        scopes.define("channel".to_string(), Value::String(event.channel.clone()));
        Self {
            shared,
            scopes: RwLock::new(scopes),
            functions: RwLock::new(handler.captured.functions.clone()),
            registry,
            resolver,
            gateway,
            fragment_id: handler.fragment_id.clone(),
            event: Some(event),
        }
    }

    // Local variable access

    pub async fn lookup_local(&self, name: &str) -> EvalResult<Value> {
        self.scopes
            .read()
            .await
            .lookup(name)
            .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))
    }

    /// `let`: defines in the innermost scope, shadowing outer bindings.
    pub async fn define_local(&self, name: String, value: Value) {
        self.scopes.write().await.define(name, value);
    }

    /// Plain assignment: updates the nearest scope holding the name, or
    /// defines it in the innermost scope.
    pub async fn assign_local(&self, name: String, value: Value) {
        self.scopes.write().await.assign(name, value);
    }

    pub async fn push_scope(&self) {
        self.scopes.write().await.push();
    }

    pub async fn pop_scope(&self) {
        self.scopes.write().await.pop();
    }

    // Shared namespace access

    pub fn shared_get(&self, name: &str) -> EvalResult<Value> {
        self.shared
            .get(name)
            .map(|value| value.clone())
            .ok_or_else(|| EvalError::UndefinedShared(name.to_string()))
    }

    pub fn shared_set(&self, name: String, value: Value) {
        self.shared.insert(name, value);
    }

    // Capability functions

    pub async fn bind_functions(&self, handle: &CapabilityHandle) {
        let mut functions = self.functions.write().await;
        for (name, native) in handle.functions() {
            functions.insert(name.clone(), *native);
        }
    }

    pub async fn lookup_function(&self, name: &str) -> Option<NativeFunction> {
        self.functions.read().await.get(name).copied()
    }

    pub fn resolver(&self) -> &Arc<CapabilityResolver> {
        &self.resolver
    }

    // Handler registration

    /// Appends a handler to the live registry, capturing the current locals
    /// and bound functions so the body sees its defining environment when
    /// dispatched later.
    pub async fn register_handler(&self, selector: EventSelector, block: Block) {
        let captured = CapturedEnv {
            locals: self.scopes.read().await.flatten(),
            functions: self.functions.read().await.clone(),
        };
        self.registry
            .push(RegisteredHandler {
                fragment_id: self.fragment_id.clone(),
                selector,
                block,
                captured,
            })
            .await;
    }

    // Event access

    pub fn event(&self) -> Option<&EventBinding> {
        self.event.as_ref()
    }

    /// Sends text back to the channel the current event came from. Outside a
    /// handler body there is no such channel, which is an ordinary
    /// evaluation error.
    pub async fn reply(&self, text: &str) -> EvalResult<()> {
        let event = self.event.as_ref().ok_or(EvalError::ReplyOutsideHandler)?;
        self.gateway
            .send_message(&event.channel, text)
            .await
            .map_err(|e| EvalError::Send(e.to_string()))
    }
}

/// Plain lexical scope stack; the outermost scope is the evaluation base.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Value>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn with_base(base: HashMap<String, Value>) -> Self {
        Self { scopes: vec![base] }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope stack never empty")
            .insert(name, value);
    }

    pub fn assign(&mut self, name: String, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(&name) {
                scope.insert(name, value);
                return;
            }
        }
        self.define(name, value);
    }

    /// Current visible bindings, inner scopes shadowing outer ones.
    pub fn flatten(&self) -> HashMap<String, Value> {
        let mut flat = HashMap::new();
        for scope in &self.scopes {
            for (name, value) in scope {
                flat.insert(name.clone(), value.clone());
            }
        }
        flat
    }
}
