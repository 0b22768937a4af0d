//! Engine - the process-scoped entry point
//!
//! Owns the cache, performance monitor, fallback policy and loaded
//! definitions, and exposes the run, metrics and admin APIs.
//!
//! Definitions are held behind an `Arc` swapped under a lock: a reload
//! affects new runs only, runs in flight keep the plan they started with.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ast::{DefinitionFile, WorkflowDefinition};
use crate::cache::{spawn_sweeper, CacheStats, CacheStore};
use crate::config::EngineConfig;
use crate::dag::{DefinitionSet, ExecutionPlan, PlanDefaults};
use crate::error::{DuckflowError, Result};
use crate::event::{EventLog, RunStream, StreamEmitter};
use crate::monitor::{PerformanceMonitor, StatsSnapshot};
use crate::registry::TaskRegistry;
use crate::resilience::{CircuitBreakerConfig, FallbackPolicy, OpenCircuit};
use crate::session::{InMemorySessionStore, SessionStore};

use super::context::{ChatInput, ExecutionContext};
use super::executor::TaskExecutor;
use super::outcome::RunOutcome;
use super::runner::Scheduler;
use super::warmup::{WarmupRunner, WarmupStatus};

/// Overall health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Some warmups failed or breakers are open
    Degraded,
    /// Not started, or every warmup failed
    Unhealthy,
}

/// Returned by [`Engine::health`]
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub ready: bool,
    pub workflows: Vec<String>,
    pub tasks: Vec<String>,
    pub warmup: BTreeMap<String, WarmupStatus>,
    pub open_circuits: Vec<OpenCircuit>,
    pub cache: CacheStats,
    pub cache_available: bool,
}

/// Returned by [`Engine::optimize`]
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeReport {
    /// Expired entries removed by the sweep
    pub swept: usize,
    pub cache_entries: usize,
    pub stats: StatsSnapshot,
    /// Whether the thresholds are still crossed after the sweep
    pub should_optimize: bool,
}

/// Chat workflow orchestration engine
pub struct Engine {
    config: EngineConfig,
    registry: Arc<TaskRegistry>,
    definitions: RwLock<Arc<DefinitionSet>>,
    defaults: PlanDefaults,
    cache: Arc<CacheStore>,
    monitor: Arc<PerformanceMonitor>,
    policy: Arc<FallbackPolicy>,
    sessions: Arc<dyn SessionStore>,
    scheduler: Scheduler,
    warmup: WarmupRunner,
    shutdown: CancellationToken,
    ready: AtomicBool,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn builder(registry: TaskRegistry) -> EngineBuilder {
        EngineBuilder::new(registry)
    }

    // ═══════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════

    /// Start the cache sweeper and, if enabled, the background warmup.
    ///
    /// Readiness is reported immediately; warmup never blocks it.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.ready.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut background = self.background.lock();
        background.push(spawn_sweeper(
            Arc::clone(&self.cache),
            self.config.cache.sweep_interval(),
            self.shutdown.child_token(),
        ));
        if self.config.engine.warmup {
            background.push(self.warmup.spawn(
                &self.registry,
                self.config.engine.default_timeout(),
                self.shutdown.child_token(),
            ));
        }
        info!(
            workflows = self.definitions.read().len(),
            tasks = self.registry.len(),
            "engine ready"
        );
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Stop background work and wait for it to wind down
    pub async fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        let handles: Vec<_> = self.background.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("background task failed: {}", e);
            }
        }
        info!("engine stopped");
    }

    // ═══════════════════════════════════════════════════════════════
    // Run API
    // ═══════════════════════════════════════════════════════════════

    /// Run a workflow to completion
    pub async fn execute(
        &self,
        workflow: &str,
        session_id: &str,
        input: ChatInput,
    ) -> Result<RunOutcome> {
        self.execute_cancellable(workflow, session_id, input, CancellationToken::new())
            .await
    }

    /// Run a workflow; firing `cancel` skips tasks not yet started and
    /// yields `RunCancelled`.
    ///
    /// The run is driven by a spawned task. Dropping the returned future
    /// fires `cancel`, but tasks already running finish and still populate
    /// the cache. Must be called from within a tokio runtime.
    pub async fn execute_cancellable(
        &self,
        workflow: &str,
        session_id: &str,
        input: ChatInput,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let plan = self.plan(workflow)?;
        let ctx = Arc::new(self.context(&plan, session_id, input, cancel.clone()));
        let log = EventLog::starting_at(Instant::now());
        let guard = cancel.drop_guard();

        let scheduler = self.scheduler.clone();
        let emitter = Arc::new(log.clone());
        let workflow_name = plan.name.to_string();
        let joined = tokio::spawn(async move { scheduler.run(plan, ctx, emitter).await }).await;
        guard.disarm();

        let mut outcome = joined.map_err(|e| DuckflowError::RunAborted {
            workflow: workflow_name,
            reason: e.to_string(),
        })??;
        outcome.events = log.events();
        Ok(outcome)
    }

    /// Run a workflow in the background and stream its events.
    ///
    /// Dropping or cancelling the stream stops delivery; tasks already
    /// running finish and still populate the cache. Must be called from
    /// within a tokio runtime.
    pub fn execute_stream(
        &self,
        workflow: &str,
        session_id: &str,
        input: ChatInput,
    ) -> Result<RunStream> {
        let plan = self.plan(workflow)?;
        let cancel = CancellationToken::new();
        let ctx = Arc::new(self.context(&plan, session_id, input, cancel.clone()));
        let (emitter, stream) = StreamEmitter::channel(
            Arc::clone(&plan.name),
            Arc::clone(&ctx.correlation_id),
            Instant::now(),
            cancel,
        );

        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            // The stream already carries the outcome as events
            let _ = scheduler.run(plan, ctx, Arc::new(emitter)).await;
        });
        Ok(stream)
    }

    fn plan(&self, workflow: &str) -> Result<Arc<ExecutionPlan>> {
        self.definitions
            .read()
            .get(workflow)
            .cloned()
            .ok_or_else(|| DuckflowError::WorkflowNotFound {
                name: workflow.to_string(),
            })
    }

    /// Build the per-run context; the session window is used when the
    /// request carries no context of its own
    fn context(
        &self,
        plan: &ExecutionPlan,
        session_id: &str,
        mut input: ChatInput,
        cancel: CancellationToken,
    ) -> ExecutionContext {
        let cap = self.config.engine.recent_messages;
        if input.recent.is_empty() {
            input.recent = self.sessions.recent(session_id, cap);
        }
        ExecutionContext::new(Arc::clone(&plan.name), session_id, input, cap, cancel)
    }

    // ═══════════════════════════════════════════════════════════════
    // Metrics API
    // ═══════════════════════════════════════════════════════════════

    pub fn stats(&self) -> StatsSnapshot {
        self.monitor.snapshot()
    }

    /// Whether the rolling figures crossed the configured thresholds
    pub fn should_optimize(&self) -> bool {
        self.monitor.should_optimize(&self.config.monitor)
    }

    /// Sweep the cache and recompute every aggregate
    pub fn optimize(&self) -> OptimizeReport {
        let swept = self.cache.sweep();
        let stats = self.monitor.snapshot();
        let should_optimize = stats.should_optimize(&self.config.monitor);
        info!(swept, entries = self.cache.len(), "optimize");
        OptimizeReport {
            swept,
            cache_entries: self.cache.len(),
            stats,
            should_optimize,
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Admin API
    // ═══════════════════════════════════════════════════════════════

    /// Drop the session's cache entries, breakers and message window.
    ///
    /// Returns the number of cache entries removed.
    pub fn invalidate_session(&self, session_id: &str) -> usize {
        let removed = self.cache.invalidate_session(session_id);
        self.policy.breakers().clear_session(session_id);
        self.sessions.clear(session_id);
        info!(session = session_id, removed, "session invalidated");
        removed
    }

    /// Replace every definition atomically.
    ///
    /// The new set is validated as a whole first; on error the current
    /// set stays active and the error is returned.
    pub fn reload(&self, definitions: Vec<WorkflowDefinition>) -> Result<()> {
        match DefinitionSet::build(definitions, &self.registry, self.defaults) {
            Ok(set) => {
                let names = set.names();
                *self.definitions.write() = Arc::new(set);
                info!(workflows = ?names, "definitions reloaded");
                Ok(())
            }
            Err(e) => {
                warn!("reload rejected, keeping current definitions: {}", e);
                Err(e)
            }
        }
    }

    pub fn reload_from_path(&self, path: &Path) -> Result<()> {
        let definitions = DefinitionFile::load(path).inspect_err(|e| {
            warn!("reload rejected, keeping current definitions: {}", e);
        })?;
        self.reload(definitions)
    }

    pub fn health(&self) -> HealthReport {
        let ready = self.is_ready();
        let warmup = self.warmup.statuses();
        let open_circuits = self.policy.breakers().open_circuits();
        let cache_available = self.cache.is_available();
        let failed = warmup.values().filter(|s| s.is_failed()).count();

        let status = if !ready || (!warmup.is_empty() && failed == warmup.len()) {
            HealthStatus::Unhealthy
        } else if failed > 0 || !open_circuits.is_empty() || !cache_available {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            ready,
            workflows: self.workflow_names(),
            tasks: self.registry.names().iter().map(|n| n.to_string()).collect(),
            warmup,
            open_circuits,
            cache: self.cache.stats(),
            cache_available,
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════

    /// Loaded workflow names, sorted
    pub fn workflow_names(&self) -> Vec<String> {
        self.definitions.read().names()
    }

    /// Current definition set (unaffected by later reloads)
    pub fn definitions(&self) -> Arc<DefinitionSet> {
        Arc::clone(&self.definitions.read())
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn warmup(&self) -> &WarmupRunner {
        &self.warmup
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("workflows", &self.workflow_names())
            .field("tasks", &self.registry.len())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Assembles an [`Engine`]; every shared service can be injected
pub struct EngineBuilder {
    registry: TaskRegistry,
    config: EngineConfig,
    definitions: Option<Vec<WorkflowDefinition>>,
    sessions: Option<Arc<dyn SessionStore>>,
    cache: Option<Arc<CacheStore>>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl EngineBuilder {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            definitions: None,
            sessions: None,
            cache: None,
            monitor: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Definitions to load; otherwise `engine.workflows_path`, otherwise none
    pub fn definitions(mut self, definitions: Vec<WorkflowDefinition>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    pub fn session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Validate the definitions and wire the engine
    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        let definitions = match (self.definitions, &config.engine.workflows_path) {
            (Some(defs), _) => defs,
            (None, Some(path)) => DefinitionFile::load(path)?,
            (None, None) => Vec::new(),
        };

        let defaults = PlanDefaults {
            timeout: config.engine.default_timeout(),
            ttl: config.cache.default_ttl(),
        };
        let set = DefinitionSet::build(definitions, &self.registry, defaults)?;

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(CacheStore::new(config.cache.max_entries)));
        let monitor = self
            .monitor
            .unwrap_or_else(|| Arc::new(PerformanceMonitor::from_config(&config.monitor)));
        let sessions = self.sessions.unwrap_or_else(|| {
            Arc::new(InMemorySessionStore::new(config.engine.recent_messages))
        });
        let policy = Arc::new(FallbackPolicy::new(CircuitBreakerConfig::from(
            &config.breaker,
        )));

        let executor = TaskExecutor::new(
            Arc::clone(&cache),
            Arc::clone(&policy),
            Arc::clone(&monitor),
            config.cache.context_messages,
        );
        let scheduler = Scheduler::new(executor, config.engine.max_concurrency);

        Ok(Engine {
            registry: Arc::new(self.registry),
            definitions: RwLock::new(Arc::new(set)),
            defaults,
            cache,
            monitor,
            policy,
            sessions,
            scheduler,
            warmup: WarmupRunner::new(),
            shutdown: CancellationToken::new(),
            ready: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
            config,
        })
    }
}
