//! The re-evaluation engine.
//!
//! Any change to the fragment store invalidates the whole derived program
//! state: registered handlers may belong to edited or deleted fragments, and
//! shared values may have been produced by code that no longer exists in
//! that form. Rather than diffing, [`Engine::refresh`] derives the running
//! program from the entire current fragment set every time — the registry is
//! cleared and every fragment re-evaluated in store order against the same
//! shared namespace. Fragments cannot be safely un-run, so this is the
//! simplest model that stays deterministic.
//!
//! Failures are isolated per fragment: a broken fragment gets its failure
//! marker and an operator report, and the loop moves on. The one exception
//! is a capability install, which aborts the refresh and asks the process to
//! restart.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::annotate::Annotator;
use crate::capability::CapabilityResolver;
use crate::eval::context::ExecutionContext;
use crate::eval::expression::Value;
use crate::eval::{EvalResult, Evaluator};
use crate::fragment::{Fragment, FragmentStore};
use crate::gateway::{AuthorId, ChatGateway};
use crate::report::Reporter;
use crate::router::HandlerRegistry;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("capability {name} installed; restart required")]
    RestartRequired { name: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

pub struct Engine {
    store: Arc<RwLock<FragmentStore>>,
    registry: Arc<HandlerRegistry>,
    // Process-wide shared namespace; survives refresh cycles by design.
    shared: Arc<DashMap<String, Value>>,
    evaluator: Arc<Evaluator>,
    resolver: Arc<CapabilityResolver>,
    gateway: Arc<dyn ChatGateway>,
    annotator: Annotator,
    reporter: Reporter,
    trusted_authors: Vec<AuthorId>,
    // Serializes whole refresh cycles; see `refresh`.
    refresh_lock: Mutex<()>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<RwLock<FragmentStore>>,
        registry: Arc<HandlerRegistry>,
        shared: Arc<DashMap<String, Value>>,
        evaluator: Arc<Evaluator>,
        resolver: Arc<CapabilityResolver>,
        gateway: Arc<dyn ChatGateway>,
        annotator: Annotator,
        reporter: Reporter,
        trusted_authors: Vec<AuthorId>,
    ) -> Self {
        Self {
            store,
            registry,
            shared,
            evaluator,
            resolver,
            gateway,
            annotator,
            reporter,
            trusted_authors,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Rebuilds the derived program state from the current fragment set.
    ///
    /// Invocations serialize on an internal mutex: two refreshes never
    /// interleave their evaluation loops, and each one reads the store
    /// snapshot only after acquiring the lock, so the Nth refresh observes a
    /// fragment set at least as current as the store at its invocation.
    /// Idempotent for an unchanged store.
    pub async fn refresh(&self) -> EngineResult<()> {
        let _guard = self.refresh_lock.lock().await;

        // Stale handlers must be unreachable before any fragment runs.
        self.registry.clear().await;

        let fragments = self.store.read().await.snapshot();
        debug!(count = fragments.len(), "refreshing fragments");

        for fragment in &fragments {
            assert!(
                self.trusted_authors.contains(&fragment.author_id),
                "fragment {} stored for untrusted author {}",
                fragment.id,
                fragment.author_id
            );

            let blocks = fragment.code_blocks();
            if blocks.is_empty() {
                continue;
            }

            match self.eval_fragment(fragment, &blocks).await {
                Ok(()) => self.annotate(fragment, true),
                Err(e) => {
                    if let Some(name) = e.restart_required() {
                        info!(name, "aborting refresh for restart");
                        return Err(EngineError::RestartRequired {
                            name: name.to_string(),
                        });
                    }
                    self.annotate(fragment, false);
                    let reporter = self.reporter.clone();
                    let description =
                        format!("error evaluating code in fragment {}", fragment.id);
                    tokio::spawn(async move {
                        reporter.report(&description, &e).await;
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs a fragment's blocks in order against one fresh context over the
    /// shared namespace. The first failing block aborts the fragment;
    /// handlers registered before the failure stay registered.
    async fn eval_fragment(&self, fragment: &Fragment, blocks: &[String]) -> EvalResult<()> {
        let context = Arc::new(ExecutionContext::for_fragment(
            self.shared.clone(),
            self.registry.clone(),
            self.resolver.clone(),
            self.gateway.clone(),
            fragment.id.clone(),
        ));
        for block in blocks {
            self.evaluator.eval_source(block, context.clone()).await?;
        }
        Ok(())
    }

    // Annotation is fire-and-forget relative to the refresh loop.
    fn annotate(&self, fragment: &Fragment, success: bool) {
        let annotator = self.annotator.clone();
        let channel_id = fragment.channel_id.clone();
        let message_id = fragment.id.clone();
        tokio::spawn(async move {
            annotator
                .mark_outcome(&channel_id, &message_id, success)
                .await;
        });
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn shared_value(&self, name: &str) -> Option<Value> {
        self.shared.get(name).map(|value| value.clone())
    }
}
