//! System wiring and the event intake loop.
//!
//! The system owns every stateful component and is the single place where
//! inbound gateway events become state changes: fragment-channel traffic
//! from trusted authors mutates the store and triggers a refresh, everything
//! else goes to the router. Own-identity messages are discarded before
//! anything looks at them.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::annotate::Annotator;
use crate::capability::{CapabilityError, CapabilityResolver};
use crate::config::{ConfigError, SystemConfig};
use crate::engine::{Engine, EngineError};
use crate::eval::Evaluator;
use crate::fragment::{Fragment, FragmentStore};
use crate::gateway::{ChatGateway, GatewayError, GatewayEvent, InboundMessage};
use crate::report::Reporter;
use crate::router::{EventRouter, HandlerRegistry, RouterError};

/// Exit status telling the supervisor to restart the process after a
/// capability install. EX_TEMPFAIL: transient, try again.
pub const RESTART_EXIT_CODE: i32 = 75;

#[derive(Error, Debug)]
pub enum SystemError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("channel {channel_id} holds more than {max} messages; refusing to start")]
    HistoryTooLarge { channel_id: String, max: usize },

    #[error("failed to load channel history: {0}")]
    Backfill(#[from] GatewayError),

    #[error("capability resolver: {0}")]
    Capability(#[from] CapabilityError),

    #[error("capability {name} installed; restart required")]
    RestartRequired { name: String },
}

impl SystemError {
    /// Whether this error is the restart directive rather than a failure.
    pub fn is_restart(&self) -> bool {
        matches!(self, SystemError::RestartRequired { .. })
    }
}

pub type SystemResult<T> = Result<T, SystemError>;

pub struct System {
    config: SystemConfig,
    gateway: Arc<dyn ChatGateway>,
    store: Arc<RwLock<FragmentStore>>,
    engine: Arc<Engine>,
    router: EventRouter,
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System").finish_non_exhaustive()
    }
}

impl System {
    pub fn new(config: SystemConfig, gateway: Arc<dyn ChatGateway>) -> SystemResult<Self> {
        config.validate()?;

        let resolver = Arc::new(CapabilityResolver::load(&config.capability)?);
        let shared = Arc::new(DashMap::new());
        let registry = Arc::new(HandlerRegistry::default());
        let store = Arc::new(RwLock::new(FragmentStore::new()));
        let evaluator = Arc::new(Evaluator::new());
        let reporter = Reporter::new(gateway.clone(), config.log_channel.clone());
        let annotator = Annotator::new(gateway.clone(), reporter.clone());

        let engine = Arc::new(Engine::new(
            store.clone(),
            registry.clone(),
            shared.clone(),
            evaluator.clone(),
            resolver.clone(),
            gateway.clone(),
            annotator,
            reporter.clone(),
            config.trusted_authors.clone(),
        ));
        let router = EventRouter::new(registry, shared, resolver, gateway.clone(), evaluator, reporter);

        Ok(Self {
            config,
            gateway,
            store,
            engine,
            router,
        })
    }

    /// Seeds the store from channel history and runs the initial refresh.
    ///
    /// Fetches one message past the cap: more than `max_fragments` messages
    /// in a code channel means the history can no longer be represented in
    /// full, which is a setup defect, not something to silently truncate.
    pub async fn bootstrap(&self) -> SystemResult<()> {
        let max = self.config.max_fragments;
        let mut fragments = Vec::new();
        for channel_id in &self.config.code_channels {
            let messages = self.gateway.history(channel_id, max + 1).await?;
            if messages.len() > max {
                return Err(SystemError::HistoryTooLarge {
                    channel_id: channel_id.clone(),
                    max,
                });
            }
            debug!(channel_id, count = messages.len(), "backfilled channel");
            fragments.extend(
                messages
                    .iter()
                    .filter(|message| !self.is_own(message) && self.is_trusted(&message.author_id))
                    .map(Fragment::from_message),
            );
        }

        self.store.write().await.replace_all(fragments);
        self.refresh().await?;
        info!("started successfully");
        Ok(())
    }

    /// Routes one inbound event. Fragment-channel traffic from trusted
    /// authors mutates the store and refreshes; everything else is
    /// dispatched to registered handlers.
    pub async fn handle_event(&self, event: GatewayEvent) -> SystemResult<()> {
        match event {
            GatewayEvent::MessageCreate(message) => {
                if self.is_own(&message) {
                    return Ok(());
                }
                if self.is_code_channel(&message.channel_id) && self.is_trusted(&message.author_id)
                {
                    self.store
                        .write()
                        .await
                        .upsert(Fragment::from_message(&message));
                    return self.refresh().await;
                }
                self.dispatch(&message).await
            }
            GatewayEvent::MessageUpdate(message) => {
                if self.is_own(&message) {
                    return Ok(());
                }
                let tracked = self.is_code_channel(&message.channel_id)
                    && self.store.read().await.contains(&message.id);
                if tracked {
                    self.store
                        .write()
                        .await
                        .upsert(Fragment::from_message(&message));
                    return self.refresh().await;
                }
                self.dispatch(&message).await
            }
            GatewayEvent::MessageDelete { id, .. } => {
                if self.store.write().await.remove(&id) {
                    return self.refresh().await;
                }
                Ok(())
            }
        }
    }

    /// Consumes the event intake until it closes or a restart is required.
    pub async fn run(&self, mut intake: mpsc::Receiver<GatewayEvent>) -> SystemResult<()> {
        self.bootstrap().await?;
        while let Some(event) = intake.recv().await {
            self.handle_event(event).await?;
        }
        info!("event intake closed; shutting down");
        Ok(())
    }

    async fn refresh(&self) -> SystemResult<()> {
        self.engine.refresh().await.map_err(|e| match e {
            EngineError::RestartRequired { name } => SystemError::RestartRequired { name },
        })
    }

    async fn dispatch(&self, message: &InboundMessage) -> SystemResult<()> {
        self.router.dispatch(message).await.map_err(|e| match e {
            RouterError::RestartRequired { name } => SystemError::RestartRequired { name },
        })
    }

    fn is_trusted(&self, author_id: &str) -> bool {
        self.config
            .trusted_authors
            .iter()
            .any(|trusted| trusted == author_id)
    }

    fn is_code_channel(&self, channel_id: &str) -> bool {
        self.config
            .code_channels
            .iter()
            .any(|channel| channel == channel_id)
    }

    fn is_own(&self, message: &InboundMessage) -> bool {
        message.is_self || message.author_id == self.config.self_id
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn fragment_count(&self) -> usize {
        self.store.read().await.len()
    }
}
