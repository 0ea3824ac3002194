//! Fleet manager implementation
//!
//! Composes the registry, queue, balancer, breakers, health policy, and
//! autoscaler. All registry mutation flows through the manager's dispatch
//! and health paths; the balancer and autoscaler only ever see snapshots.

use cedar_balance::LoadBalancer;
use cedar_health::{BreakerBoard, CircuitState, HealthPolicy, HealthVerdict};
use cedar_registry::{AgentRegistry, Executor};
use cedar_scale::{select_victims, AutoScaler, ScalingDecision};
use cedar_types::{
    AgentConfig, AgentId, AgentInstance, AgentStatus, EventSeverity, FleetConfig, FleetError,
    FleetEvent, Result, SystemMetrics, TaskEnvelope, TaskId,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::queue::TaskQueue;

/// Pause after a dispatch pass that found no available agent.
const DISPATCH_BACKOFF: Duration = Duration::from_millis(50);
/// Base delay of the exponential retry backoff.
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(250);
/// Ceiling of the exponential retry backoff.
const RETRY_BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Poll interval for bounded drain waits.
const DRAIN_POLL: Duration = Duration::from_millis(25);
/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Exponential backoff for the nth retry, capped.
fn retry_backoff(retry_count: u32) -> Duration {
    let exp = retry_count.saturating_sub(1).min(16);
    RETRY_BACKOFF_BASE.saturating_mul(1 << exp).min(RETRY_BACKOFF_CAP)
}

/// Orchestrator owning the task queue, agent registry, and control loops.
pub struct FleetManager {
    config: FleetConfig,
    registry: Arc<AgentRegistry>,
    queue: Arc<TaskQueue>,
    breakers: Arc<BreakerBoard>,
    balancer: Arc<LoadBalancer>,
    policy: HealthPolicy,
    scaler: AutoScaler,
    executors: DashMap<String, Arc<dyn Executor>>,
    event_tx: broadcast::Sender<FleetEvent>,
    shutdown_tx: watch::Sender<bool>,
    draining: AtomicBool,
    in_flight: AtomicUsize,
    pending_retries: AtomicUsize,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    latest_metrics: RwLock<SystemMetrics>,
    loop_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FleetManager {
    /// Create a manager from a validated configuration.
    pub fn new(config: FleetConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            queue: Arc::new(TaskQueue::new(config.max_concurrent_tasks)),
            breakers: Arc::new(BreakerBoard::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_timeout,
            )),
            balancer: Arc::new(LoadBalancer::new(config.strategy)),
            policy: HealthPolicy::new(config.health_check_interval),
            scaler: AutoScaler::new(
                config.min_agent_instances,
                config.max_agent_instances,
                config.scaling_cooldown,
                config.default_agent_type.clone(),
            ),
            registry: Arc::new(AgentRegistry::new()),
            executors: DashMap::new(),
            event_tx,
            shutdown_tx,
            draining: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            pending_retries: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            latest_metrics: RwLock::new(SystemMetrics::default()),
            loop_handles: Mutex::new(Vec::new()),
            config,
        }))
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Register the execution logic for an agent type.
    ///
    /// Must happen before any deploy of that type, including the startup
    /// deploys of `default_agent_type`.
    pub fn register_executor(&self, agent_type: &str, executor: Arc<dyn Executor>) {
        self.executors.insert(agent_type.to_string(), executor);
    }

    /// Subscribe to the fleet event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.event_tx.subscribe()
    }

    /// Deploy the minimum fleet and start the background loops.
    ///
    /// Fails fatally only if the minimum agents cannot be initialized
    /// within `agent_startup_timeout`.
    pub async fn startup(self: &Arc<Self>) -> Result<()> {
        info!(
            min_agents = self.config.min_agent_instances,
            agent_type = %self.config.default_agent_type,
            strategy = ?self.balancer.strategy(),
            "Fleet manager starting"
        );

        for _ in 0..self.config.min_agent_instances {
            let agent_type = self.config.default_agent_type.clone();
            self.deploy_agent(&agent_type, AgentConfig::default()).await?;
        }

        let mut handles = self.loop_handles.lock().unwrap();
        handles.push(tokio::spawn(
            self.clone().run_dispatch_loop(self.shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            self.clone().run_health_loop(self.shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            self.clone().run_metrics_loop(self.shutdown_tx.subscribe()),
        ));
        if self.config.autoscale_enabled {
            handles.push(tokio::spawn(
                self.clone().run_autoscale_loop(self.shutdown_tx.subscribe()),
            ));
        }

        info!("Fleet manager started");
        Ok(())
    }

    /// Register and initialize a new agent instance.
    #[instrument(skip(self, config))]
    pub async fn deploy_agent(&self, agent_type: &str, config: AgentConfig) -> Result<AgentId> {
        config.validate()?;

        if self.registry.len() >= self.config.max_agents {
            return Err(FleetError::FleetFull {
                limit: self.config.max_agents,
            });
        }

        let executor = self
            .executors
            .get(agent_type)
            .map(|e| e.clone())
            .ok_or_else(|| FleetError::Initialization {
                agent_type: agent_type.to_string(),
                reason: "no executor registered for agent type".to_string(),
            })?;

        let instance = AgentInstance::new(agent_type, &config);
        let agent_id = instance.id.clone();
        let snapshot = instance.clone();
        self.registry.insert(instance, executor.clone());

        let init = tokio::time::timeout(
            self.config.agent_startup_timeout,
            executor.initialize(&snapshot),
        )
        .await;

        match init {
            Ok(Ok(())) => {
                self.transition(&agent_id, AgentStatus::Active);
                self.emit(FleetEvent::AgentDeployed {
                    agent_id: agent_id.clone(),
                    agent_type: agent_type.to_string(),
                });
                Ok(agent_id)
            }
            Ok(Err(err)) => {
                // Left registered in Error status for diagnosis.
                self.transition(&agent_id, AgentStatus::Error);
                Err(FleetError::Initialization {
                    agent_type: agent_type.to_string(),
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                self.transition(&agent_id, AgentStatus::Error);
                Err(FleetError::Initialization {
                    agent_type: agent_type.to_string(),
                    reason: format!(
                        "initialization timed out after {:?}",
                        self.config.agent_startup_timeout
                    ),
                })
            }
        }
    }

    /// Drain and remove an agent instance.
    #[instrument(skip(self))]
    pub async fn terminate_agent(&self, agent_id: &AgentId) -> Result<()> {
        if !self.registry.contains(agent_id) {
            return Err(FleetError::AgentNotFound(agent_id.clone()));
        }

        self.transition(agent_id, AgentStatus::Terminating);

        // Bounded wait for in-flight work to finish.
        let deadline = Instant::now() + self.config.drain_timeout;
        loop {
            let load = self
                .registry
                .get(agent_id)
                .map(|a| a.current_load)
                .unwrap_or(0);
            if load == 0 || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }

        self.transition(agent_id, AgentStatus::Terminated);
        self.registry.remove(agent_id);
        self.breakers.remove(agent_id);
        self.emit(FleetEvent::AgentTerminated {
            agent_id: agent_id.clone(),
        });
        Ok(())
    }

    /// Enqueue a task for dispatch.
    ///
    /// Only submission-time errors surface here; execution failures are
    /// retried internally and reported on the event stream.
    pub fn submit_task(&self, task: TaskEnvelope) -> Result<TaskId> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(FleetError::ShuttingDown);
        }
        let task_id = task.id.clone();
        self.queue.push(task)?;
        debug!(task_id = %task_id, "Task submitted");
        Ok(task_id)
    }

    /// Read-only fleet snapshot. Never blocks on the dispatch loop.
    pub fn status(&self) -> SystemMetrics {
        self.collect_metrics()
    }

    /// Stop intake, drain bounded, terminate agents, join loops.
    pub async fn shutdown(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Fleet manager draining");
        self.queue.close();

        // Let the dispatch loop work off queued and in-flight tasks.
        // Retry copies sleeping out a backoff count as pending work too;
        // once the queue is closed they resolve by cancelling themselves.
        let deadline = Instant::now() + self.config.drain_timeout;
        while (self.queue.depth() > 0
            || self.in_flight.load(Ordering::SeqCst) > 0
            || self.pending_retries.load(Ordering::SeqCst) > 0)
            && Instant::now() < deadline
        {
            tokio::time::sleep(DRAIN_POLL).await;
        }

        let _ = self.shutdown_tx.send(true);

        // Anything still queued is discarded, with a recorded cancellation.
        for task in self.queue.drain() {
            warn!(task_id = %task.id, "Discarding queued task on shutdown");
            self.emit(FleetEvent::TaskCancelled { task_id: task.id });
        }

        for agent in self.registry.list() {
            if let Err(err) = self.terminate_agent(&agent.id).await {
                warn!(agent_id = %agent.id, error = %err, "Termination failed during shutdown");
            }
        }

        let handles: Vec<_> = self.loop_handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("Fleet manager stopped");
    }

    // ─── dispatch path ───────────────────────────────────────────────

    async fn run_dispatch_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!("Dispatch loop started");
        loop {
            let task = tokio::select! {
                task = self.queue.pop() => task,
                _ = shutdown.changed() => break,
            };
            let Some(task) = task else { break };

            if let Some(backoff) = self.dispatch(task) {
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
        debug!("Dispatch loop stopped");
    }

    /// Try to place one task. Returns a backoff when the task had to be
    /// requeued so the loop pauses instead of spinning.
    fn dispatch(self: &Arc<Self>, task: TaskEnvelope) -> Option<Duration> {
        let candidates = match task.preferred_agent_type.as_deref() {
            Some(agent_type) => {
                let typed = self.registry.list_by_type(agent_type);
                if typed.is_empty() {
                    self.registry.list()
                } else {
                    typed
                }
            }
            None => self.registry.list(),
        };
        let available: Vec<AgentInstance> =
            candidates.into_iter().filter(|a| a.is_available()).collect();

        if available.is_empty() {
            debug!(task_id = %task.id, "No available agent, requeueing");
            self.queue.requeue_front(task);
            return Some(DISPATCH_BACKOFF);
        }

        let Some(agent_id) = self.balancer.select(&available, &task) else {
            self.queue.requeue_front(task);
            return Some(DISPATCH_BACKOFF);
        };

        // The snapshot may be stale; reservation re-checks under the lock.
        if !self.registry.try_acquire(&agent_id) {
            self.queue.requeue_front(task);
            return Some(DISPATCH_BACKOFF);
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let manager = self.clone();
        tokio::spawn(async move {
            manager.execute_task(agent_id, task).await;
        });
        None
    }

    async fn execute_task(self: Arc<Self>, agent_id: AgentId, task: TaskEnvelope) {
        let started = Instant::now();
        let was_half_open = self.breakers.state(&agent_id) == Some(CircuitState::HalfOpen);
        let outcome = self.run_through_breaker(&agent_id, &task).await;
        let duration = started.elapsed();

        match outcome {
            Ok(_) => {
                self.registry.release(&agent_id, true, duration);
                self.tasks_completed.fetch_add(1, Ordering::SeqCst);
                if was_half_open {
                    self.emit(FleetEvent::CircuitClosed {
                        agent_id: agent_id.clone(),
                    });
                }
                self.emit(FleetEvent::TaskCompleted {
                    task_id: task.id.clone(),
                    agent_id,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Err(err) => {
                match err {
                    // The breaker rejected the call outright; the agent
                    // never saw the task, so no outcome is recorded.
                    FleetError::CircuitOpen(_) => self.registry.release_unexecuted(&agent_id),
                    _ => self.registry.release(&agent_id, false, duration),
                }
                if self.breakers.state(&agent_id) == Some(CircuitState::Open) {
                    self.quarantine(&agent_id);
                }
                self.handle_task_failure(task, err);
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn run_through_breaker(
        &self,
        agent_id: &AgentId,
        task: &TaskEnvelope,
    ) -> Result<serde_json::Value> {
        let executor = self
            .registry
            .executor(agent_id)
            .ok_or_else(|| FleetError::AgentNotFound(agent_id.clone()))?;
        let breaker = self.breakers.breaker(agent_id);
        let timeout = self.config.task_execution_timeout;
        let task_id = task.id.clone();

        breaker
            .execute(|| async move {
                match tokio::time::timeout(timeout, executor.run(task)).await {
                    Ok(result) => result,
                    Err(_) => Err(FleetError::TaskTimeout { task_id, timeout }),
                }
            })
            .await
    }

    /// Exclude an agent whose circuit opened from further dispatch. The
    /// health monitor repairs it later.
    fn quarantine(&self, agent_id: &AgentId) {
        if let Some(agent) = self.registry.get(agent_id) {
            if agent.status != AgentStatus::Error {
                self.emit(FleetEvent::CircuitOpened {
                    agent_id: agent_id.clone(),
                });
                self.transition(agent_id, AgentStatus::Error);
            }
        }
    }

    /// Apply the retry policy after an execution failure.
    fn handle_task_failure(self: &Arc<Self>, task: TaskEnvelope, err: FleetError) {
        if err.is_retryable() && task.retry_count < self.config.max_task_retries {
            let retried = task.retry();
            let delay = retry_backoff(retried.retry_count);
            self.emit(FleetEvent::TaskRetried {
                task_id: retried.id.clone(),
                retry_count: retried.retry_count,
                reason: err.to_string(),
            });
            self.pending_retries.fetch_add(1, Ordering::SeqCst);
            let manager = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // Intake stopped while this retry slept out its backoff;
                // record the discard instead of requeueing into a queue
                // nothing will pop again.
                if manager.queue.is_closed() {
                    warn!(task_id = %retried.id, "Discarding pending retry on shutdown");
                    manager.emit(FleetEvent::TaskCancelled {
                        task_id: retried.id,
                    });
                } else {
                    manager.queue.requeue_back(retried);
                }
                manager.pending_retries.fetch_sub(1, Ordering::SeqCst);
            });
        } else {
            self.tasks_failed.fetch_add(1, Ordering::SeqCst);
            error!(
                task_id = %task.id,
                retries = task.retry_count,
                error = %err,
                "Task permanently failed"
            );
            self.emit(FleetEvent::TaskFailed {
                task_id: task.id,
                reason: err.to_string(),
            });
        }
    }

    // ─── health path ─────────────────────────────────────────────────

    async fn run_health_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!(
            heartbeat_timeout = ?self.policy.heartbeat_timeout(),
            "Health loop started"
        );
        let mut ticker = interval(self.config.health_check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.health_check_once().await,
                _ = shutdown.changed() => break,
            }
        }
        debug!("Health loop stopped");
    }

    async fn health_check_once(&self) {
        for agent in self.registry.list() {
            match self.policy.assess(&agent) {
                HealthVerdict::Healthy => {}
                HealthVerdict::Degrade => {
                    if matches!(agent.status, AgentStatus::Active | AgentStatus::Busy) {
                        info!(
                            agent_id = %agent.id,
                            health_score = agent.health_score,
                            "Demoting degraded agent"
                        );
                        self.transition(&agent.id, AgentStatus::Idle);
                    }
                }
                HealthVerdict::Repair(reason) => {
                    warn!(agent_id = %agent.id, reason = %reason, "Agent unhealthy");
                    self.transition(&agent.id, AgentStatus::Error);
                    self.repair_agent(&agent).await;
                }
            }
        }
    }

    /// Attempt an in-place restart; replace the agent if that fails.
    ///
    /// Replacement guarantees the fleet size recovers even when the
    /// individual agent is unrecoverable.
    async fn repair_agent(&self, agent: &AgentInstance) {
        if let Some(executor) = self.registry.executor(&agent.id) {
            let restart = tokio::time::timeout(
                self.config.agent_startup_timeout,
                executor.initialize(agent),
            )
            .await;
            if matches!(restart, Ok(Ok(()))) {
                let _ = self.registry.update(&agent.id, |a| a.reset_for_restart());
                self.breakers.reset(&agent.id);
                info!(agent_id = %agent.id, "Agent restarted in place");
                self.emit(FleetEvent::AgentRepaired {
                    agent_id: agent.id.clone(),
                });
                return;
            }
        }

        warn!(agent_id = %agent.id, "Restart failed, replacing agent");
        self.registry.remove(&agent.id);
        self.breakers.remove(&agent.id);
        match self.deploy_agent(&agent.agent_type, agent.to_config()).await {
            Ok(new_agent_id) => {
                self.emit(FleetEvent::AgentReplaced {
                    old_agent_id: agent.id.clone(),
                    new_agent_id,
                    agent_type: agent.agent_type.clone(),
                });
            }
            Err(err) => {
                error!(
                    agent_id = %agent.id,
                    error = %err,
                    "Replacement deploy failed"
                );
            }
        }
    }

    // ─── metrics and scaling ─────────────────────────────────────────

    async fn run_metrics_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.metrics_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.collect_metrics();
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Metrics loop stopped");
    }

    fn collect_metrics(&self) -> SystemMetrics {
        let metrics = SystemMetrics::collect(
            &self.registry.list(),
            self.queue.depth(),
            self.in_flight.load(Ordering::SeqCst),
            self.config.max_concurrent_tasks,
            self.tasks_completed.load(Ordering::SeqCst),
            self.tasks_failed.load(Ordering::SeqCst),
        );
        *self.latest_metrics.write().unwrap() = metrics.clone();
        metrics
    }

    async fn run_autoscale_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.autoscale_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.autoscale_once().await,
                _ = shutdown.changed() => break,
            }
        }
        debug!("Autoscale loop stopped");
    }

    async fn autoscale_once(&self) {
        let agents = self.registry.list();
        let metrics = self.latest_metrics.read().unwrap().clone();

        match self.scaler.evaluate(&metrics, &agents) {
            ScalingDecision::None => {}
            ScalingDecision::ScaleUp { count, agent_type } => {
                let mut deployed = 0;
                for _ in 0..count {
                    match self.deploy_agent(&agent_type, AgentConfig::default()).await {
                        Ok(_) => deployed += 1,
                        Err(err) => {
                            warn!(error = %err, "Scale-up deploy failed");
                            break;
                        }
                    }
                }
                if deployed > 0 {
                    self.emit(FleetEvent::ScaledUp {
                        count: deployed,
                        agent_type,
                    });
                }
            }
            ScalingDecision::ScaleDown { count } => {
                let mut removed = 0;
                for agent_id in select_victims(&agents, count) {
                    match self.terminate_agent(&agent_id).await {
                        Ok(()) => removed += 1,
                        Err(err) => {
                            warn!(agent_id = %agent_id, error = %err, "Scale-down failed")
                        }
                    }
                }
                if removed > 0 {
                    self.emit(FleetEvent::ScaledDown { count: removed });
                }
            }
        }
    }

    // ─── shared helpers ──────────────────────────────────────────────

    fn transition(&self, agent_id: &AgentId, to: AgentStatus) {
        if let Ok(from) = self.registry.set_status(agent_id, to) {
            if from != to {
                self.emit(FleetEvent::AgentStatusChanged {
                    agent_id: agent_id.clone(),
                    from,
                    to,
                });
            }
        }
    }

    fn emit(&self, event: FleetEvent) {
        match event.severity() {
            EventSeverity::Debug => debug!(event = ?event, "Fleet event"),
            EventSeverity::Info => info!(event = ?event, "Fleet event"),
            EventSeverity::Warning => warn!(event = ?event, "Fleet event"),
            EventSeverity::Error => error!(event = ?event, "Fleet event"),
        }
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(1), Duration::from_millis(250));
        assert_eq!(retry_backoff(2), Duration::from_millis(500));
        assert_eq!(retry_backoff(3), Duration::from_secs(1));
        assert_eq!(retry_backoff(10), RETRY_BACKOFF_CAP);
        assert_eq!(retry_backoff(u32::MAX), RETRY_BACKOFF_CAP);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = FleetConfig {
            min_agent_instances: 9,
            max_agent_instances: 3,
            ..FleetConfig::default()
        };
        assert!(FleetManager::new(config).is_err());
    }

    #[tokio::test]
    async fn test_deploy_requires_registered_executor() {
        let manager = FleetManager::new(FleetConfig::default()).unwrap();
        let result = manager.deploy_agent("ghost", AgentConfig::default()).await;
        assert!(matches!(result, Err(FleetError::Initialization { .. })));
    }
}
