// ABOUTME: Scheduler - runs sync tasks once on demand or on a cron schedule
// ABOUTME: Tracks one registration per scheduled task and one in-flight run per task

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::models::{SyncMode, SyncTask, TaskStatus};
use crate::store::MetadataStore;
use crate::sync::{SyncEngine, SyncStats};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("sync task {0} not found")]
    NotFound(i64),

    #[error("sync task {0} is already running")]
    AlreadyRunning(i64),

    #[error("invalid cron expression '{expr}': {message}")]
    InvalidSchedule { expr: String, message: String },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Parse a six-field, seconds-first cron expression.
pub fn parse_schedule(expr: &str) -> Result<Schedule, SchedulerError> {
    Schedule::from_str(expr.trim()).map_err(|e| SchedulerError::InvalidSchedule {
        expr: expr.to_string(),
        message: e.to_string(),
    })
}

/// Marks a task as in flight until dropped.
pub struct RunGuard {
    in_flight: Arc<Mutex<HashSet<i64>>>,
    task_id: i64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.task_id);
        }
    }
}

struct Inner {
    store: Arc<dyn MetadataStore>,
    engine: Arc<SyncEngine>,
    registrations: Mutex<HashMap<i64, JoinHandle<()>>>,
    dispatched: Mutex<HashMap<i64, JoinHandle<()>>>,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

/// Cheap to clone; clones share registrations and run tracking.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn MetadataStore>, engine: Arc<SyncEngine>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                engine,
                registrations: Mutex::new(HashMap::new()),
                dispatched: Mutex::new(HashMap::new()),
                in_flight: Arc::new(Mutex::new(HashSet::new())),
            }),
        }
    }

    /// Claim the run slot for a task.
    pub fn try_begin(&self, task_id: i64) -> Result<RunGuard, SchedulerError> {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .map_err(|_| anyhow::anyhow!("scheduler lock poisoned"))?;
        if !in_flight.insert(task_id) {
            return Err(SchedulerError::AlreadyRunning(task_id));
        }
        Ok(RunGuard {
            in_flight: Arc::clone(&self.inner.in_flight),
            task_id,
        })
    }

    pub fn is_in_flight(&self, task_id: i64) -> bool {
        self.inner
            .in_flight
            .lock()
            .map(|set| set.contains(&task_id))
            .unwrap_or(false)
    }

    pub fn is_registered(&self, task_id: i64) -> bool {
        self.inner
            .registrations
            .lock()
            .map(|regs| regs.contains_key(&task_id))
            .unwrap_or(false)
    }

    fn load(&self, task_id: i64) -> Result<SyncTask, SchedulerError> {
        self.inner
            .store
            .get_task(task_id)?
            .ok_or(SchedulerError::NotFound(task_id))
    }

    fn check_connections(&self, task: &SyncTask) -> Result<(), SchedulerError> {
        for (role, id) in [("source", task.source_db_id), ("target", task.target_db_id)] {
            if self.inner.store.get_connection(id)?.is_none() {
                return Err(SyncError::config(format!(
                    "{} connection {} does not exist",
                    role, id
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Start a task: one background run for on-demand tasks, a recurring
    /// registration for scheduled ones.
    pub fn start(&self, task_id: i64) -> Result<(), SchedulerError> {
        let task = self.load(task_id)?;
        self.check_connections(&task)?;
        match task.mode {
            SyncMode::OnDemand => self.dispatch(task),
            SyncMode::Scheduled => self.register(task),
        }
    }

    fn dispatch(&self, task: SyncTask) -> Result<(), SchedulerError> {
        let guard = self.try_begin(task.id)?;
        self.inner.store.set_task_status(task.id, TaskStatus::Running)?;
        tracing::info!("Dispatching on-demand run of task {} ({})", task.id, task.name);

        let inner = Arc::clone(&self.inner);
        let task_id = task.id;
        let handle = tokio::spawn(async move {
            let result = inner.engine.sync_task(&task).await;
            drop(guard);

            let stopped_meanwhile = matches!(
                inner.store.get_task(task.id),
                Ok(Some(current)) if current.status == TaskStatus::Stopped
            );
            let status = match (&result, stopped_meanwhile) {
                (_, true) => TaskStatus::Stopped,
                (Ok(_), false) => TaskStatus::Stopped,
                (Err(_), false) => TaskStatus::Error,
            };
            if let Err(e) = inner.store.record_task_run(task.id, status, Utc::now()) {
                tracing::error!("Failed to record run of task {}: {:#}", task.id, e);
            }
        });

        if let Ok(mut dispatched) = self.inner.dispatched.lock() {
            dispatched.retain(|_, h| !h.is_finished());
            dispatched.insert(task_id, handle);
        }
        Ok(())
    }

    fn register(&self, task: SyncTask) -> Result<(), SchedulerError> {
        let expr = task.cron_expr.clone().unwrap_or_default();
        let schedule = parse_schedule(&expr)?;

        let scheduler = self.clone();
        let task_id = task.id;
        let handle = tokio::spawn(async move {
            for next in schedule.upcoming(Utc) {
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                // A firing runs as its own task: aborting the registration
                // detaches a started run instead of cancelling it.
                let firing = scheduler.clone();
                match tokio::spawn(async move { firing.fire(task_id).await }).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => tracing::error!("Scheduled run of task {} panicked: {}", task_id, e),
                }
            }
            tracing::debug!("Schedule for task {} ended", task_id);
        });

        let mut registrations = self
            .inner
            .registrations
            .lock()
            .map_err(|_| anyhow::anyhow!("scheduler lock poisoned"))?;
        if let Some(previous) = registrations.insert(task_id, handle) {
            previous.abort();
            tracing::info!("Replaced schedule of task {}", task_id);
        }
        drop(registrations);

        self.inner.store.set_task_status(task_id, TaskStatus::Running)?;
        tracing::info!("Scheduled task {} ({}) with '{}'", task_id, task.name, expr);
        Ok(())
    }

    /// One scheduled firing. Returns false when the task is gone.
    ///
    /// A task stopped while the run was in progress stays stopped.
    async fn fire(&self, task_id: i64) -> bool {
        let task = match self.inner.store.get_task(task_id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!("Scheduled task {} no longer exists; unscheduling", task_id);
                return false;
            }
            Err(e) => {
                tracing::error!("Failed to load scheduled task {}: {:#}", task_id, e);
                return true;
            }
        };
        let _guard = match self.try_begin(task_id) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!("Skipping scheduled run: {}", e);
                return true;
            }
        };

        let result = self.inner.engine.sync_task(&task).await;

        let stopped_meanwhile = matches!(
            self.inner.store.get_task(task_id),
            Ok(Some(current)) if current.status == TaskStatus::Stopped
        );
        let status = match (&result, stopped_meanwhile) {
            (_, true) => TaskStatus::Stopped,
            (Ok(_), false) => TaskStatus::Running,
            (Err(_), false) => TaskStatus::Error,
        };
        if let Err(e) = self.inner.store.record_task_run(task_id, status, Utc::now()) {
            tracing::error!("Failed to record run of task {}: {:#}", task_id, e);
        }
        true
    }

    /// Drop any registration and mark the task stopped.
    ///
    /// A run already in progress, on-demand or scheduled, finishes and is
    /// logged, but its result does not change the stopped status.
    pub fn stop(&self, task_id: i64) -> Result<(), SchedulerError> {
        self.load(task_id)?;
        self.unregister(task_id);
        self.inner.store.set_task_status(task_id, TaskStatus::Stopped)?;
        tracing::info!("Stopped task {}", task_id);
        Ok(())
    }

    /// Abort a task's registration without touching its record.
    pub fn unregister(&self, task_id: i64) -> bool {
        let handle = self
            .inner
            .registrations
            .lock()
            .ok()
            .and_then(|mut regs| regs.remove(&task_id));
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Run a task now and wait for it.
    ///
    /// Success keeps the current status; failure marks the task errored.
    pub async fn execute(&self, task_id: i64) -> Result<SyncStats, SchedulerError> {
        let task = self.load(task_id)?;
        let _guard = self.try_begin(task_id)?;

        let result = self.inner.engine.sync_task(&task).await;
        let status = match &result {
            Ok(_) => self
                .inner
                .store
                .get_task(task_id)?
                .map(|current| current.status)
                .unwrap_or(task.status),
            Err(_) => TaskStatus::Error,
        };
        self.inner.store.record_task_run(task_id, status, Utc::now())?;
        Ok(result?)
    }

    /// Wait for the last on-demand run of `task_id`, if one is tracked.
    pub async fn wait_for(&self, task_id: i64) {
        let handle = self
            .inner
            .dispatched
            .lock()
            .ok()
            .and_then(|mut dispatched| dispatched.remove(&task_id));
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("On-demand run of task {} panicked: {}", task_id, e);
            }
        }
    }

    /// Re-register scheduled tasks that were running before a restart.
    pub fn restore(&self) -> Result<usize, SchedulerError> {
        let mut restored = 0;
        for task in self.inner.store.list_tasks()? {
            if task.mode != SyncMode::Scheduled || task.status != TaskStatus::Running {
                continue;
            }
            match self.register(task.clone()) {
                Ok(()) => restored += 1,
                Err(e) => {
                    tracing::error!("Could not restore schedule of task {}: {}", task.id, e);
                    self.inner.store.set_task_status(task.id, TaskStatus::Error)?;
                }
            }
        }
        if restored > 0 {
            tracing::info!("Restored {} scheduled tasks", restored);
        }
        Ok(restored)
    }

    /// Abort every registration. Used on shutdown.
    pub fn shutdown(&self) {
        if let Ok(mut regs) = self.inner.registrations.lock() {
            for (_, handle) in regs.drain() {
                handle.abort();
            }
        }
    }
}
