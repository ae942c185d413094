//! The task synchronization engine.
//!
//! A single worker task owns the [`TaskMap`], the [`SourceSelector`], the
//! push feed, the in-flight poll and every timer. Consumers get read-only
//! snapshots through a `watch` channel; local writes are sent to the worker
//! as commands. Dropping the [`TaskSyncEngine`] aborts the worker, which
//! drops every pending timer and discards any poll still in flight.

use std::collections::{HashMap, HashSet};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, sleep_until};
use tracing::{debug, info, warn};

use wardops_config::SyncConfig;
use wardops_core::backend::{FeedMessage, TaskBackend, TaskFeed};
use wardops_core::clock::{Clock, SystemClock};
use wardops_core::error::BackendError;
use wardops_core::event::{DomainEvent, EventBus};
use wardops_core::task::{NewTask, Task, TaskStatus};

use crate::error::SyncError;
use crate::map::{Change, TaskMap};
use crate::source::{SourceSelector, SyncSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// How long the push channel has to confirm before polling starts.
    /// Also the delay between re-subscription attempts after push is lost.
    pub fallback_timeout: Duration,
    pub poll_interval: Duration,
    /// Progress projection period
    pub tick: Duration,
    /// How long a finished task stays visible
    pub grace: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            fallback_timeout: Duration::from_secs(config.fallback_timeout_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            tick: Duration::from_millis(config.tick_millis),
            grace: Duration::from_millis(config.grace_millis),
        }
    }
}

enum Command {
    /// Apply a record the backend just returned to a local write.
    Apply {
        task: Task,
        applied: oneshot::Sender<()>,
    },
}

pub struct SyncEngineBuilder {
    backend: Arc<dyn TaskBackend>,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
    event_bus: Option<Arc<EventBus>>,
}

impl SyncEngineBuilder {
    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn start(self) -> TaskSyncEngine {
        let session_start = self.clock.now();
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (tasks_tx, tasks_rx) = watch::channel(Vec::new());
        let (source_tx, source_rx) = watch::channel(SyncSource::Connecting);

        let worker = Worker {
            backend: self.backend.clone(),
            clock: self.clock,
            settings: self.settings,
            session_start,
            event_bus: self.event_bus,
            map: TaskMap::new(),
            selector: SourceSelector::new(),
            removals: HashMap::new(),
            feed: None,
            connecting: None,
            poll: None,
            poll_issued: (Instant::now(), session_start),
            next_poll: None,
            fallback_at: None,
            resubscribe_at: None,
            tasks_tx,
            source_tx,
        };

        info!(
            session_start = %session_start,
            fallback_timeout_ms = self.settings.fallback_timeout.as_millis() as u64,
            "Starting task synchronization"
        );
        let worker = tokio::spawn(worker.run(commands_rx));

        TaskSyncEngine {
            backend: self.backend,
            commands: commands_tx,
            tasks: tasks_rx,
            source: source_rx,
            session_start,
            worker,
        }
    }
}

/// Handle to the running engine.
pub struct TaskSyncEngine {
    backend: Arc<dyn TaskBackend>,
    commands: mpsc::Sender<Command>,
    tasks: watch::Receiver<Vec<Task>>,
    source: watch::Receiver<SyncSource>,
    session_start: DateTime<Utc>,
    worker: JoinHandle<()>,
}

impl TaskSyncEngine {
    pub fn builder(backend: Arc<dyn TaskBackend>) -> SyncEngineBuilder {
        SyncEngineBuilder {
            backend,
            settings: SyncSettings::default(),
            clock: Arc::new(SystemClock),
            event_bus: None,
        }
    }

    /// Start with the system clock and no event bus.
    pub fn start(backend: Arc<dyn TaskBackend>, settings: SyncSettings) -> Self {
        Self::builder(backend).settings(settings).start()
    }

    /// Every task in the live map, including finished ones still inside
    /// their grace window. Oldest first.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.borrow().clone()
    }

    /// Pending and in-progress tasks only.
    pub fn active_tasks(&self) -> Vec<Task> {
        self.tasks
            .borrow()
            .iter()
            .filter(|t| t.status.is_active())
            .cloned()
            .collect()
    }

    /// A receiver that sees every new snapshot of the live map.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.tasks.clone()
    }

    pub fn source(&self) -> SyncSource {
        *self.source.borrow()
    }

    pub fn source_changes(&self) -> watch::Receiver<SyncSource> {
        self.source.clone()
    }

    /// Polls only return tasks created at or after this instant.
    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    /// Persist a new task. The stored record is in the live map by the time
    /// this returns.
    pub async fn create_task(&self, draft: NewTask) -> Result<Task, SyncError> {
        self.ensure_running()?;
        let task = self.backend.insert_task(draft).await?;
        self.apply_local(task.clone()).await?;
        info!(task_id = %task.id, kind = task.kind.as_str(), target = %task.target_location_id, "Task created");
        Ok(task)
    }

    pub async fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, SyncError> {
        self.ensure_running()?;
        let task = self.backend.update_task_status(id, status).await?;
        self.apply_local(task.clone()).await?;
        Ok(task)
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop the worker and every timer it owns.
    pub fn shutdown(&self) {
        self.worker.abort();
    }

    fn ensure_running(&self) -> Result<(), SyncError> {
        if self.commands.is_closed() || self.worker.is_finished() {
            return Err(SyncError::Stopped);
        }
        Ok(())
    }

    async fn apply_local(&self, task: Task) -> Result<(), SyncError> {
        let (applied, done) = oneshot::channel();
        self.commands
            .send(Command::Apply { task, applied })
            .await
            .map_err(|_| SyncError::Stopped)?;
        done.await.map_err(|_| SyncError::Stopped)
    }
}

impl Drop for TaskSyncEngine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

struct Worker {
    backend: Arc<dyn TaskBackend>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    session_start: DateTime<Utc>,
    event_bus: Option<Arc<EventBus>>,

    map: TaskMap,
    selector: SourceSelector,
    /// Task id -> when it leaves the map
    removals: HashMap<String, Instant>,

    feed: Option<TaskFeed>,
    connecting: Option<BoxFuture<'static, Result<TaskFeed, BackendError>>>,
    poll: Option<BoxFuture<'static, Result<Vec<Task>, BackendError>>>,
    /// When the in-flight poll was issued, monotonic and wall time
    poll_issued: (Instant, DateTime<Utc>),

    next_poll: Option<Instant>,
    fallback_at: Option<Instant>,
    resubscribe_at: Option<Instant>,

    tasks_tx: watch::Sender<Vec<Task>>,
    source_tx: watch::Sender<SyncSource>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut tick = tokio::time::interval(self.settings.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.fallback_at = Some(Instant::now() + self.settings.fallback_timeout);
        self.connect();

        loop {
            let next_removal = self.removals.values().min().copied();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Apply { task, applied }) => {
                        if self.apply(task) {
                            self.publish_tasks();
                        }
                        let _ = applied.send(());
                    }
                    None => break,
                },
                result = resolve(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_subscribe_result(result);
                }
                message = next_message(&mut self.feed) => self.on_feed_message(message),
                () = sleep_until_opt(self.fallback_at) => {
                    self.fallback_at = None;
                    self.on_fallback_timeout();
                }
                () = sleep_until_opt(self.next_poll) => {
                    self.next_poll = None;
                    self.start_poll();
                }
                result = resolve(&mut self.poll) => {
                    self.poll = None;
                    self.on_poll_result(result);
                }
                () = sleep_until_opt(self.resubscribe_at) => {
                    self.resubscribe_at = None;
                    self.connect();
                }
                () = sleep_until_opt(next_removal) => self.remove_expired(),
                _ = tick.tick() => self.project(),
            }
        }

        debug!("Task sync worker stopped");
    }

    fn connect(&mut self) {
        if self.connecting.is_some() || self.feed.is_some() {
            return;
        }
        debug!("Subscribing to task changes");
        let backend = self.backend.clone();
        self.connecting = Some(async move { backend.subscribe().await }.boxed());
    }

    fn on_subscribe_result(&mut self, result: Result<TaskFeed, BackendError>) {
        match result {
            Ok(feed) => {
                debug!("Subscribed, waiting for the push channel to confirm");
                self.feed = Some(feed);
            }
            Err(e) => {
                warn!(error = %e, "Task subscription failed");
                self.on_push_lost();
            }
        }
    }

    fn on_feed_message(&mut self, message: Option<FeedMessage>) {
        match message {
            Some(FeedMessage::Subscribed) => self.on_push_confirmed(),
            Some(FeedMessage::Inserted { task } | FeedMessage::Updated { task }) => {
                if self.selector.accepts_push_data() && self.apply(task) {
                    self.publish_tasks();
                }
            }
            Some(FeedMessage::Deleted { id }) => {
                if self.selector.accepts_push_data() && self.map.remove(&id).is_some() {
                    self.removals.remove(&id);
                    debug!(task_id = %id, "Task deleted");
                    self.publish_tasks();
                }
            }
            Some(FeedMessage::ChannelError { reason }) => {
                warn!(reason = %reason, "Push channel error");
                self.feed = None;
                self.on_push_lost();
            }
            None => {
                warn!("Push channel closed");
                self.feed = None;
                self.on_push_lost();
            }
        }
    }

    fn on_push_confirmed(&mut self) {
        self.fallback_at = None;
        self.next_poll = None;
        self.resubscribe_at = None;
        if self.poll.take().is_some() {
            debug!("Discarding in-flight poll");
        }
        if self.selector.on_push_confirmed() {
            info!("Push channel confirmed, polling stopped");
            self.publish_source();
        }
    }

    fn on_push_lost(&mut self) {
        if self.connecting.is_none() {
            self.resubscribe_at = Some(Instant::now() + self.settings.fallback_timeout);
        }
        if self.selector.on_push_lost() {
            info!("Push channel lost, falling back to polling");
            self.publish_source();
            self.begin_polling();
        }
    }

    fn on_fallback_timeout(&mut self) {
        if self.selector.on_fallback_timeout() {
            warn!(
                timeout_ms = self.settings.fallback_timeout.as_millis() as u64,
                "Push channel not confirmed in time, falling back to polling"
            );
            self.publish_source();
            self.begin_polling();
        }
    }

    fn begin_polling(&mut self) {
        if self.poll.is_none() {
            self.next_poll = Some(Instant::now());
        }
    }

    fn start_poll(&mut self) {
        if !self.selector.accepts_poll_data() || self.poll.is_some() {
            return;
        }
        let backend = self.backend.clone();
        let since = self.session_start;
        self.poll_issued = (Instant::now(), self.clock.now());
        self.poll = Some(async move { backend.fetch_active_since(since).await }.boxed());
    }

    fn on_poll_result(&mut self, result: Result<Vec<Task>, BackendError>) {
        if !self.selector.accepts_poll_data() {
            return;
        }
        let (issued, issued_wall) = self.poll_issued;
        self.next_poll = Some(issued + self.settings.poll_interval);

        match result {
            Ok(tasks) => {
                debug!(count = tasks.len(), "Poll returned");
                if self.apply_poll(tasks, issued_wall) {
                    self.publish_tasks();
                }
            }
            Err(e) => warn!(error = %e, "Poll failed"),
        }
    }

    /// A poll returns every active task of the session, so an active task
    /// it leaves out was finished or deleted elsewhere.
    fn apply_poll(&mut self, tasks: Vec<Task>, issued_wall: DateTime<Utc>) -> bool {
        let seen: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut changed = false;
        for task in tasks {
            changed |= self.apply(task);
        }

        let vanished: Vec<String> = self
            .map
            .active_ids()
            .filter(|id| !seen.contains(*id))
            .filter(|id| {
                // created after the poll was issued; the next one will tell
                self.map.get(id).is_some_and(|t| t.created_at <= issued_wall)
            })
            .map(str::to_owned)
            .collect();
        for id in vanished {
            debug!(task_id = %id, "Task missing from poll");
            self.schedule_removal(id);
        }
        changed
    }

    /// Upsert one record. Returns whether the visible map changed.
    fn apply(&mut self, task: Task) -> bool {
        let id = task.id.clone();
        let status = task.status;
        let previous = self.map.get(&id).map(|t| t.status);

        let change = self.map.upsert(task);
        match change {
            Change::Stale => {
                debug!(task_id = %id, incoming = %status, "Dropped stale task record");
                return false;
            }
            Change::Ignored => return false,
            Change::Inserted | Change::Updated | Change::Unchanged => {}
        }

        if status.is_terminal() {
            self.schedule_removal(id.clone());
        } else {
            self.removals.remove(&id);
        }

        if previous != Some(status) {
            debug!(task_id = %id, status = %status, "Task status changed");
            if let Some(bus) = &self.event_bus {
                bus.publish(DomainEvent::TaskChanged {
                    task_id: id,
                    status: status.to_string(),
                    timestamp: self.clock.now(),
                });
            }
        }
        change.is_visible()
    }

    fn schedule_removal(&mut self, id: String) {
        let grace = self.settings.grace;
        self.removals
            .entry(id)
            .or_insert_with(|| Instant::now() + grace);
    }

    fn remove_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .removals
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut changed = false;
        for id in expired {
            self.removals.remove(&id);
            if self.map.remove(&id).is_some() {
                debug!(task_id = %id, "Task removed after grace window");
                changed = true;
            }
        }
        if changed {
            self.publish_tasks();
        }
    }

    fn project(&mut self) {
        if self.map.project(self.clock.now()) > 0 {
            self.publish_tasks();
        }
    }

    fn publish_tasks(&self) {
        self.tasks_tx.send_replace(self.map.snapshot());
    }

    fn publish_source(&self) {
        let source = self.selector.current();
        self.source_tx.send_replace(source);
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::SyncSourceChanged {
                source: source.to_string(),
                timestamp: self.clock.now(),
            });
        }
    }
}

async fn resolve<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_message(feed: &mut Option<TaskFeed>) -> Option<FeedMessage> {
    match feed {
        Some(feed) => feed.next().await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;
    use wardops_core::clock::MonotonicClock;
    use wardops_core::task::TaskKind;
    use wardops_store::InMemoryWard;

    /// Delegates to the in-memory ward and counts polls.
    struct Counting {
        ward: Arc<InMemoryWard>,
        polls: AtomicUsize,
    }

    impl Counting {
        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskBackend for Counting {
        async fn insert_task(&self, draft: NewTask) -> Result<Task, BackendError> {
            self.ward.insert_task(draft).await
        }

        async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, BackendError> {
            self.ward.update_task_status(id, status).await
        }

        async fn fetch_active_since(&self, since: DateTime<Utc>) -> Result<Vec<Task>, BackendError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.ward.fetch_active_since(since).await
        }

        async fn subscribe(&self) -> Result<TaskFeed, BackendError> {
            self.ward.subscribe().await
        }
    }

    struct Harness {
        ward: Arc<InMemoryWard>,
        backend: Arc<Counting>,
        engine: TaskSyncEngine,
        clock: Arc<MonotonicClock>,
    }

    fn harness(configure: impl FnOnce(InMemoryWard) -> InMemoryWard) -> Harness {
        let clock = Arc::new(MonotonicClock::new());
        let ward = Arc::new(configure(InMemoryWard::seeded().with_clock(clock.clone())));
        let backend = Arc::new(Counting {
            ward: ward.clone(),
            polls: AtomicUsize::new(0),
        });
        let engine = TaskSyncEngine::builder(backend.clone())
            .clock(clock.clone())
            .start();
        Harness {
            ward,
            backend,
            engine,
            clock,
        }
    }

    fn progress_of(engine: &TaskSyncEngine, id: &str) -> f64 {
        engine
            .tasks()
            .into_iter()
            .find(|t| t.id == id)
            .map(|t| t.progress)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_push_never_polls() {
        let h = harness(|w| w);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(h.engine.source(), SyncSource::Push);

        sleep(Duration::from_secs(20)).await;
        assert_eq!(h.backend.polls(), 0);
        assert_eq!(h.engine.source(), SyncSource::Push);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_projected_and_capped() {
        let h = harness(|w| w);
        let task = h
            .engine
            .create_task(NewTask::new(TaskKind::FoodDelivery, "room-101"))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert_eq!(task.estimated_duration_seconds, 30);
        assert_eq!(h.engine.active_tasks().len(), 1);

        h.engine
            .update_status(&task.id, TaskStatus::InProgress)
            .await
            .unwrap();

        sleep(Duration::from_secs(15)).await;
        let halfway = progress_of(&h.engine, &task.id);
        assert!((halfway - 50.0).abs() <= 4.0, "progress was {halfway}");

        let mut last = halfway;
        for _ in 0..20 {
            sleep(Duration::from_secs(1)).await;
            let now = progress_of(&h.engine, &task.id);
            assert!(now >= last && now <= 100.0);
            last = now;
        }
        assert_eq!(last, 100.0);
        assert_eq!(h.engine.tasks()[0].status, TaskStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_push_falls_back_to_session_polling() {
        let h = harness(|w| w.without_push());

        let mut earlier = NewTask::new(TaskKind::Cleaning, "room-105")
            .into_task(h.clock.origin() - chrono::Duration::minutes(30));
        earlier.id = "earlier-session".into();
        h.ward.insert_existing(earlier).await;

        sleep(Duration::from_secs(4)).await;
        assert_eq!(h.engine.source(), SyncSource::Connecting);
        assert_eq!(h.backend.polls(), 0);

        let fresh = h
            .ward
            .insert_task(NewTask::new(TaskKind::MedicationDelivery, "room-102"))
            .await
            .unwrap();

        sleep(Duration::from_secs(2)).await;
        assert_eq!(h.engine.source(), SyncSource::Polling);
        assert_eq!(h.backend.polls(), 1);
        let ids: Vec<_> = h.engine.tasks().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![fresh.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_stops_scheduled_polls() {
        let h = harness(|w| w.without_push());
        sleep(Duration::from_secs(7)).await;
        assert_eq!(h.engine.source(), SyncSource::Polling);
        assert_eq!(h.backend.polls(), 1);

        h.ward.set_push_ready(true);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.engine.source(), SyncSource::Push);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.backend.polls(), 1);

        let task = h
            .ward
            .insert_task(NewTask::new(TaskKind::EquipmentDelivery, "room-201"))
            .await
            .unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(h.engine.tasks().iter().any(|t| t.id == task.id));
    }

    #[tokio::test(start_paused = true)]
    async fn finished_tasks_leave_after_the_grace_window() {
        let h = harness(|w| w);
        let task = h
            .engine
            .create_task(NewTask::new(TaskKind::LabSamplePickup, "room-203"))
            .await
            .unwrap();
        h.engine
            .update_status(&task.id, TaskStatus::InProgress)
            .await
            .unwrap();
        h.engine
            .update_status(&task.id, TaskStatus::Completed)
            .await
            .unwrap();

        let snapshot = h.engine.tasks();
        assert_eq!(snapshot[0].status, TaskStatus::Completed);
        assert_eq!(snapshot[0].progress, 100.0);
        assert!(h.engine.active_tasks().is_empty());

        sleep(Duration::from_secs(1)).await;
        assert_eq!(h.engine.tasks().len(), 1);
        sleep(Duration::from_millis(1500)).await;
        assert!(h.engine.tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_delete_removes_immediately() {
        let h = harness(|w| w);
        let task = h
            .engine
            .create_task(NewTask::new(TaskKind::Maintenance, "room-204"))
            .await
            .unwrap();
        h.ward.delete_task(&task.id).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(h.engine.tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_push_polls_then_resubscribes() {
        let h = harness(|w| w);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.engine.source(), SyncSource::Push);

        h.ward.disconnect_feeds("server restart").await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.engine.source(), SyncSource::Polling);
        assert_eq!(h.backend.polls(), 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.engine.source(), SyncSource::Push);
        let polls = h.backend.polls();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.backend.polls(), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_subscription_polls_without_waiting() {
        let clock = Arc::new(MonotonicClock::new());
        let ward = Arc::new(InMemoryWard::seeded().with_clock(clock.clone()));
        ward.refuse_subscriptions(true);
        let backend = Arc::new(Counting {
            ward: ward.clone(),
            polls: AtomicUsize::new(0),
        });
        let engine = TaskSyncEngine::builder(backend.clone()).clock(clock).start();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.source(), SyncSource::Polling);
        assert_eq!(backend.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_missing_from_a_poll_are_removed_after_grace() {
        let h = harness(|w| w.without_push());
        let task = h
            .ward
            .insert_task(NewTask::new(TaskKind::SupplyRestock, "room-106"))
            .await
            .unwrap();

        // first poll at 5s
        sleep(Duration::from_secs(6)).await;
        assert_eq!(h.engine.tasks().len(), 1);

        h.ward.delete_task(&task.id).await.unwrap();
        // second poll at 8s misses it; removal at 10s
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(h.engine.tasks().len(), 1);
        sleep(Duration::from_secs(2)).await;
        assert!(h.engine.tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn local_writes_apply_while_polling() {
        let h = harness(|w| w.without_push());
        sleep(Duration::from_secs(6)).await;
        assert_eq!(h.engine.source(), SyncSource::Polling);

        let task = h
            .engine
            .create_task(NewTask::new(TaskKind::PatientTransport, "room-301"))
            .await
            .unwrap();
        assert_eq!(h.engine.tasks().len(), 1);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.engine.tasks()[0].id, task.id);
    }

    #[tokio::test(start_paused = true)]
    async fn events_report_source_and_task_changes() {
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let ward = Arc::new(InMemoryWard::seeded());
        let engine = TaskSyncEngine::builder(ward).event_bus(bus).start();

        sleep(Duration::from_millis(10)).await;
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::SyncSourceChanged { source, .. } if source == "push"
        ));

        engine
            .create_task(NewTask::new(TaskKind::PatientCheck, "room-102"))
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::TaskChanged { status, .. } if status == "pending"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_worker() {
        let h = harness(|w| w);
        h.engine.shutdown();
        sleep(Duration::from_millis(10)).await;
        assert!(!h.engine.is_running());

        let err = h
            .engine
            .create_task(NewTask::new(TaskKind::FoodDelivery, "room-101"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Stopped));
        assert!(h.ward.tasks().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_engine_releases_the_backend() {
        let h = harness(|w| w);
        let weak = Arc::downgrade(&h.backend);
        let Harness { backend, engine, .. } = h;
        drop(backend);
        drop(engine);
        sleep(Duration::from_millis(10)).await;
        assert!(weak.upgrade().is_none());
    }
}
