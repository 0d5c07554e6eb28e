//! Event dispatcher.
//!
//! Events are queued without blocking the caller and executed by worker
//! tasks. For each target address a worker resolves the persona, takes its
//! lock, runs the handler and releases the lock before moving on, so no step
//! ever holds two persona locks.
//!
//! Two execution modes are available:
//!
//! - **Serial**: one worker runs every event, and every step of an event in
//!   target order. Events run in submission order.
//! - **Sharded**: an intake task resolves each target to its canonical
//!   address, in submission order, and queues the step on the worker owning
//!   that address's shard. Steps for one persona run in submission order
//!   whichever alias they were addressed to; unrelated personas proceed in
//!   parallel.

mod event;

pub use event::{Event, EventHandler, PersonaEvent};

use futures_util::FutureExt;
use parley_proto::Address;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Notify, mpsc};
use tracing::{Instrument, debug, error, trace, warn};

use crate::error::{RouterError, RouterResult};
use crate::metrics;
use crate::switchboard::Switchboard;
use crate::telemetry::{EventTimer, spans};

/// How queued events are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Serial,
    Sharded { workers: usize },
}

enum Job {
    /// A whole event, every target in order.
    Run(Event),
    /// One target of an event.
    Step {
        target: Address,
        handler: Arc<dyn EventHandler>,
    },
    /// Wakes a worker after shutdown.
    Wake,
}

/// Work for the sharded intake task.
enum Intake {
    Event(Event),
    Wake,
}

/// Counters shared between the dispatcher and its workers.
struct DispatchState {
    accepting: AtomicBool,
    pending: AtomicUsize,
    idle: Notify,
}

impl DispatchState {
    fn start_one(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }
}

/// Worker queues, one per shard.
struct Shards {
    senders: Vec<mpsc::UnboundedSender<Job>>,
    state: Arc<DispatchState>,
}

impl Shards {
    fn enqueue(&self, shard: usize, job: Job) -> RouterResult {
        self.state.start_one();
        if self.senders[shard].send(job).is_err() {
            self.state.finish_one();
            return Err(RouterError::DispatcherClosed);
        }
        Ok(())
    }

    /// Queue one step on the shard owning `target`.
    fn enqueue_step(&self, target: Address, handler: Arc<dyn EventHandler>) -> RouterResult {
        let shard = self.shard_for(&target);
        self.enqueue(shard, Job::Step { target, handler })
    }

    fn shard_for(&self, address: &Address) -> usize {
        let mut hasher = DefaultHasher::new();
        address.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    fn wake_all(&self) {
        for tx in &self.senders {
            let _ = tx.send(Job::Wake);
        }
    }
}

pub struct Dispatcher {
    mode: DispatchMode,
    shards: Arc<Shards>,
    intake: Option<mpsc::UnboundedSender<Intake>>,
    state: Arc<DispatchState>,
}

impl Dispatcher {
    /// Spawn the worker tasks. Must be called inside a Tokio runtime.
    pub(crate) fn start(mode: DispatchMode, hub: Weak<Switchboard>) -> Self {
        let workers = match mode {
            DispatchMode::Serial => 1,
            DispatchMode::Sharded { workers } => workers.max(1),
        };
        let state = Arc::new(DispatchState {
            accepting: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let senders = (0..workers)
            .map(|shard| {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(
                    worker(shard, hub.clone(), Arc::clone(&state), rx)
                        .instrument(spans::worker(shard)),
                );
                tx
            })
            .collect();
        let shards = Arc::new(Shards {
            senders,
            state: Arc::clone(&state),
        });

        let intake = match mode {
            DispatchMode::Serial => None,
            DispatchMode::Sharded { .. } => {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(
                    run_intake(hub, Arc::clone(&shards), rx).instrument(spans::intake()),
                );
                Some(tx)
            }
        };

        debug!(?mode, workers, "Dispatcher started");
        Self {
            mode,
            shards,
            intake,
            state,
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Number of queued or running jobs.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.state.is_accepting()
    }

    /// Queue an event. Never blocks; fails only after shutdown.
    pub fn post(&self, event: Event) -> RouterResult {
        if !self.state.is_accepting() {
            return Err(RouterError::DispatcherClosed);
        }
        if event.targets.is_empty() {
            trace!(event = event.name(), "Event without targets dropped");
            return Ok(());
        }
        let Some(intake) = &self.intake else {
            return self.shards.enqueue(0, Job::Run(event));
        };
        self.state.start_one();
        if intake.send(Intake::Event(event)).is_err() {
            self.state.finish_one();
            return Err(RouterError::DispatcherClosed);
        }
        Ok(())
    }

    /// Resolves once no job is queued or running.
    ///
    /// Jobs posted by running handlers are counted before the posting job
    /// finishes, so cascades are waited for too.
    pub async fn settled(&self) {
        loop {
            let notified = self.state.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting events. Jobs still queued are discarded by the workers.
    pub fn shutdown(&self) {
        if self.state.accepting.swap(false, Ordering::AcqRel) {
            debug!("Dispatcher shutting down");
            if let Some(intake) = &self.intake {
                let _ = intake.send(Intake::Wake);
            }
            self.shards.wake_all();
        }
    }
}

/// Sharded mode: resolve every target of each event, in submission order,
/// and queue the steps on the shards owning the canonical addresses.
async fn run_intake(
    hub: Weak<Switchboard>,
    shards: Arc<Shards>,
    mut rx: mpsc::UnboundedReceiver<Intake>,
) {
    while let Some(item) = rx.recv().await {
        let Intake::Event(event) = item else {
            trace!("Intake woken");
            continue;
        };
        let Some(hub) = hub.upgrade() else {
            shards.state.finish_one();
            break;
        };
        if shards.state.is_accepting() {
            let Event { targets, handler } = event;
            for target in targets {
                let canonical = hub.registry().canonical(&target).await;
                if let Err(e) = shards.enqueue_step(canonical, Arc::clone(&handler)) {
                    debug!(event = handler.name(), error = %e, "Step dropped");
                    break;
                }
            }
        } else {
            trace!("Queued event discarded after shutdown");
        }
        drop(hub);
        shards.state.finish_one();
    }
    debug!("Intake stopped");
}

async fn worker(
    shard: usize,
    hub: Weak<Switchboard>,
    state: Arc<DispatchState>,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = rx.recv().await {
        if matches!(job, Job::Wake) {
            trace!(shard, "Worker woken");
            continue;
        }
        let Some(hub) = hub.upgrade() else {
            state.finish_one();
            break;
        };
        if state.is_accepting() {
            run_job(&hub, job).await;
        } else {
            trace!(shard, "Queued job discarded after shutdown");
        }
        drop(hub);
        state.finish_one();
    }
    debug!(shard, "Worker stopped");
}

async fn run_job(hub: &Switchboard, job: Job) {
    match job {
        Job::Run(event) => {
            for target in &event.targets {
                run_step(hub, target, event.handler.as_ref()).await;
            }
        }
        Job::Step { target, handler } => run_step(hub, &target, handler.as_ref()).await,
        Job::Wake => {}
    }
}

/// Apply one handler to one persona. Failures are contained to this step.
async fn run_step(hub: &Switchboard, target: &Address, handler: &dyn EventHandler) {
    let name = handler.name();
    let ctx = hub.context();
    let _timer = EventTimer::new(name);
    let outcome = loop {
        let persona = match hub.registry().get_or_load(target).await {
            Ok(persona) => persona,
            Err(e) => {
                warn!(event = name, persona = %target, error = %e, "Failed to load persona");
                metrics::record_event_failure(name, e.error_code());
                return;
            }
        };
        let mut guard = persona.lock().await;
        if guard.is_evicted() {
            trace!(event = name, persona = %target, "Persona evicted while queued, reloading");
            continue;
        }
        break AssertUnwindSafe(handler.handle(&ctx, &mut guard))
            .catch_unwind()
            .instrument(spans::event(name, target))
            .await;
    };

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(event = name, persona = %target, error = %e, "Event failed");
            metrics::record_event_failure(name, e.error_code());
        }
        Err(_) => {
            error!(event = name, persona = %target, "Event handler panicked");
            metrics::record_event_failure(name, "panic");
        }
    }
}
