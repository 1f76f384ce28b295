//! Session coordinator: owns the pool of search units and the best result.
//!
//! All merges into [`BestKnown`] happen on the coordinator thread, so two
//! units finishing together can never both win. Each batch carries the
//! threshold current at dispatch time, and its result is re-checked against
//! the live best on arrival.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::crypto::Primitive;
use crate::matcher::{Score, Scorer};
use crate::search::{BestKnown, Candidate, SaltPolicy, Wallet};

use super::unit::{
    BatchRequest, Notification, SearchUnit, UnitError, UnitEvent, UnitId, UnitState,
};

/// How often the coordinator wakes to check cancellation and timeouts.
const TICK: Duration = Duration::from_millis(20);

/// Consecutive failures after which a unit is retired.
const MAX_CONSECUTIVE_FAILURES: u32 = 2;

/// Parameters of one search session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub wallet: Wallet,
    /// Stop once the best score reaches this.
    pub target_score: Score,
    pub pool_size: usize,
    /// Trials per batch.
    pub batch_size: u64,
    /// Stop after this many trials in total.
    pub max_attempts: Option<u64>,
    /// Score a first result has to beat; `None` accepts anything.
    pub floor: Option<Score>,
    /// Retire-or-restart a unit whose batch runs longer than this.
    pub batch_timeout: Option<Duration>,
    /// A unit that has not loaded within this counts as failed.
    pub init_timeout: Duration,
}

impl SessionConfig {
    pub fn new(wallet: Wallet, target_score: Score, pool_size: usize) -> Self {
        Self {
            wallet,
            target_score,
            pool_size,
            batch_size: 100_000,
            max_attempts: None,
            floor: None,
            batch_timeout: None,
            init_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_floor(mut self, floor: Option<Score>) -> Self {
        self.floor = floor;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    Cancelled,
    AttemptsExhausted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::AttemptsExhausted => write!(f, "attempt limit reached"),
        }
    }
}

/// Progress stream for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ready { unit: UnitId },
    InitFailed { unit: UnitId, reason: String },
    NotReady { unit: UnitId },
    /// A new best candidate was adopted.
    Progress { best: Candidate, attempts: u64 },
    /// A unit failed. `continuing` is false when the whole session failed.
    Error {
        unit: UnitId,
        reason: String,
        continuing: bool,
    },
    Done {
        best: Option<Candidate>,
        attempts: u64,
        reason: StopReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub best: Option<Candidate>,
    /// Trials that ran, including those of failed batches before they failed.
    pub attempts: u64,
    pub reason: StopReason,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every unit was retired or never loaded. Whatever was found before
    /// that is still returned.
    #[error("all {pool_size} search units failed after {attempts} attempts")]
    AllUnitsFailed {
        pool_size: usize,
        best: Option<Candidate>,
        attempts: u64,
    },

    #[error("failed to spawn coordinator: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("coordinator thread panicked")]
    CoordinatorPanicked,
}

/// Counters readable while a session runs. Written only by the coordinator.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub attempts: AtomicU64,
    pub batches: AtomicU64,
    pub improvements: AtomicU64,
}

impl SessionStats {
    pub fn total_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
    pub fn total_batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }
    pub fn total_improvements(&self) -> u64 {
        self.improvements.load(Ordering::Relaxed)
    }
}

/// Builds search units and runs sessions over them.
pub struct Coordinator {
    primitive: Arc<dyn Primitive>,
    scorer: Arc<dyn Scorer>,
    salts: SaltPolicy,
}

impl Coordinator {
    pub fn new(primitive: Arc<dyn Primitive>, scorer: Arc<dyn Scorer>, salts: SaltPolicy) -> Self {
        Self {
            primitive,
            scorer,
            salts,
        }
    }

    /// Starts `pool_size` units and waits until each has loaded or failed.
    ///
    /// Fails with [`SessionError::AllUnitsFailed`] if none loaded; no batch is
    /// dispatched in that case. Otherwise batches start flowing to every ready
    /// unit and the running session is returned.
    pub fn start_session(&self, mut config: SessionConfig) -> Result<Session, SessionError> {
        config.batch_size = config.batch_size.max(1);
        let (unit_tx, unit_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(SessionStats::default());

        let mut state = SessionLoop {
            best: BestKnown::with_floor(config.floor),
            slots: Vec::with_capacity(config.pool_size),
            next_id: 0,
            primitive: self.primitive.clone(),
            scorer: self.scorer.clone(),
            salts: self.salts,
            unit_tx,
            unit_rx,
            events: event_tx,
            cancel: cancel.clone(),
            stats: stats.clone(),
            stop: None,
            config,
        };

        state.start_units();
        state.await_startup();
        if state.usable_units() == 0 {
            tracing::error!(pool_size = state.config.pool_size, "no search unit initialized");
            return Err(state.all_failed());
        }

        let handle = thread::Builder::new()
            .name("vanity-coordinator".into())
            .spawn(move || state.run())
            .map_err(SessionError::Spawn)?;

        Ok(Session {
            events: event_rx,
            cancel,
            stats,
            start_time: Instant::now(),
            handle: Some(handle),
        })
    }
}

/// A running session.
pub struct Session {
    events: Receiver<SessionEvent>,
    cancel: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
    start_time: Instant,
    handle: Option<JoinHandle<Result<SessionOutcome, SessionError>>>,
}

impl Session {
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Stops dispatching new batches. In-flight batches still finish.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// The cancellation flag, for external use (e.g. signal handlers).
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn attempts_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.stats.total_attempts() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Blocks until the session ends.
    pub fn wait(mut self) -> Result<SessionOutcome, SessionError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or(Err(SessionError::CoordinatorPanicked)),
            None => Err(SessionError::CoordinatorPanicked),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A batch a unit is working on.
struct InFlight {
    request: BatchRequest,
    deadline: Option<Instant>,
}

/// One position in the pool. A retired slot has no unit.
struct Slot {
    unit: Option<SearchUnit>,
    in_flight: Option<InFlight>,
    /// Batch to resubmit once a restarted unit is ready.
    retry: Option<BatchRequest>,
    init_deadline: Option<Instant>,
    failures: u32,
}

impl Slot {
    fn unit_id(&self) -> Option<UnitId> {
        self.unit.as_ref().map(SearchUnit::id)
    }
}

/// Coordinator state. Lives on a single thread once the session starts.
struct SessionLoop {
    config: SessionConfig,
    best: BestKnown,
    slots: Vec<Slot>,
    next_id: UnitId,
    primitive: Arc<dyn Primitive>,
    scorer: Arc<dyn Scorer>,
    salts: SaltPolicy,
    unit_tx: Sender<Notification>,
    unit_rx: Receiver<Notification>,
    events: Sender<SessionEvent>,
    cancel: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
    stop: Option<StopReason>,
}

impl SessionLoop {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn usable_units(&self) -> usize {
        self.slots.iter().filter(|s| s.unit.is_some()).count()
    }

    fn all_failed(&self) -> SessionError {
        SessionError::AllUnitsFailed {
            pool_size: self.config.pool_size,
            best: self.best.candidate().copied(),
            attempts: self.best.attempts(),
        }
    }

    /// Creates and starts a fresh unit under a new id.
    fn spawn_unit(&mut self) -> Result<SearchUnit, UnitError> {
        let id = self.next_id;
        self.next_id += 1;
        let mut unit = SearchUnit::new(
            id,
            self.primitive.clone(),
            self.scorer.clone(),
            self.salts,
            self.unit_tx.clone(),
        );
        unit.initialize()?;
        Ok(unit)
    }

    fn start_units(&mut self) {
        let deadline = Instant::now() + self.config.init_timeout;
        let mut failed = Vec::new();
        for _ in 0..self.config.pool_size {
            let unit = match self.spawn_unit() {
                Ok(unit) => Some(unit),
                Err(e) => {
                    failed.push(e);
                    None
                }
            };
            self.slots.push(Slot {
                init_deadline: unit.as_ref().map(|_| deadline),
                unit,
                in_flight: None,
                retry: None,
                failures: 0,
            });
        }
        // Reported once the whole pool exists, so `continuing` is accurate.
        for e in failed {
            self.report_init_failure(e.unit(), e.to_string());
        }
    }

    fn slot_of(&self, unit: UnitId) -> Option<usize> {
        self.slots.iter().position(|s| s.unit_id() == Some(unit))
    }

    fn loading(&self) -> bool {
        self.slots.iter().any(|s| s.init_deadline.is_some())
    }

    /// Collects every unit's first report; dispatch waits until all are in.
    fn await_startup(&mut self) {
        while self.loading() {
            match self.unit_rx.recv_timeout(TICK) {
                Ok(Notification { unit, event }) => {
                    let Some(index) = self.slot_of(unit) else {
                        continue;
                    };
                    match event {
                        UnitEvent::Ready => {
                            self.slots[index].init_deadline = None;
                            self.emit(SessionEvent::Ready { unit });
                        }
                        UnitEvent::InitFailed { reason } => self.on_init_failed(index, reason),
                        other => tracing::debug!(unit, event = ?other, "ignored during startup"),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.expire_inits();
        }
    }

    fn run(mut self) -> Result<SessionOutcome, SessionError> {
        self.update_stop();
        for index in 0..self.slots.len() {
            if self.slots[index].unit.is_some() {
                self.dispatch(index);
            }
        }

        loop {
            if self.usable_units() == 0 {
                return Err(self.all_failed());
            }
            self.update_stop();
            if self.stop.is_some() && !self.slots.iter().any(|s| s.in_flight.is_some()) {
                break;
            }

            match self.unit_rx.recv_timeout(TICK) {
                Ok(notification) => self.handle(notification),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.expire_inits();
            self.expire_batches();
            self.dispatch_idle();
        }

        let reason = self.stop.unwrap_or(StopReason::Cancelled);
        let outcome = SessionOutcome {
            best: self.best.candidate().copied(),
            attempts: self.best.attempts(),
            reason,
        };
        tracing::info!(
            attempts = outcome.attempts,
            score = ?outcome.best.map(|c| c.score),
            %reason,
            "session finished"
        );
        self.emit(SessionEvent::Done {
            best: outcome.best,
            attempts: outcome.attempts,
            reason,
        });
        Ok(outcome)
    }

    fn update_stop(&mut self) {
        if self.stop.is_some() {
            return;
        }
        let reason = if self.best.reached(self.config.target_score) {
            StopReason::TargetReached
        } else if self.cancel.load(Ordering::Relaxed) {
            StopReason::Cancelled
        } else if self
            .config
            .max_attempts
            .is_some_and(|max| self.best.attempts() >= max)
        {
            StopReason::AttemptsExhausted
        } else {
            return;
        };
        tracing::info!(%reason, "no further batches will be dispatched");
        self.stop = Some(reason);
    }

    /// Trials already handed out or pending a retry.
    fn committed_attempts(&self) -> u64 {
        let pending: u64 = self
            .slots
            .iter()
            .flat_map(|s| {
                s.in_flight
                    .as_ref()
                    .map(|f| f.request.iterations)
                    .into_iter()
                    .chain(s.retry.as_ref().map(|r| r.iterations))
            })
            .sum();
        self.best.attempts().saturating_add(pending)
    }

    /// Sends the next batch to the unit in `index`, using the live best score
    /// as its threshold.
    fn dispatch(&mut self, index: usize) {
        if self.stop.is_some() {
            return;
        }
        let iterations = match self.config.max_attempts {
            Some(max) => self
                .config
                .batch_size
                .min(max.saturating_sub(self.committed_attempts())),
            None => self.config.batch_size,
        };
        if iterations == 0 {
            return;
        }
        let request = BatchRequest {
            wallet: self.config.wallet.clone(),
            iterations,
            threshold: self.best.score(),
        };
        self.submit(index, request);
    }

    /// Gives work to loaded units that have none, e.g. after a retired slot
    /// released its share of the attempt budget.
    fn dispatch_idle(&mut self) {
        for index in 0..self.slots.len() {
            let slot = &self.slots[index];
            let idle = slot.in_flight.is_none()
                && slot.retry.is_none()
                && slot.init_deadline.is_none()
                && slot
                    .unit
                    .as_ref()
                    .is_some_and(|u| u.state() == UnitState::Ready);
            if idle {
                self.dispatch(index);
            }
        }
    }

    /// The batch a restarted unit replays, cut down to what the attempt
    /// limit still allows.
    fn replay(&self, mut request: BatchRequest) -> Option<BatchRequest> {
        if let Some(max) = self.config.max_attempts {
            request.iterations = request
                .iterations
                .min(max.saturating_sub(self.committed_attempts()));
        }
        (request.iterations > 0).then_some(request)
    }

    fn record_attempts(&mut self, n: u64) {
        self.best.record_attempts(n);
        self.stats.attempts.store(self.best.attempts(), Ordering::Relaxed);
    }

    fn submit(&mut self, index: usize, request: BatchRequest) {
        let Some(unit) = self.slots[index].unit.as_ref() else {
            return;
        };
        match unit.submit_batch(request.clone()) {
            Ok(()) => {
                self.stats.batches.fetch_add(1, Ordering::Relaxed);
                self.slots[index].in_flight = Some(InFlight {
                    request,
                    deadline: self.config.batch_timeout.map(|t| Instant::now() + t),
                });
            }
            // The unit reports the rejection itself; it will say Ready later.
            Err(UnitError::NotReady { unit, state }) => {
                tracing::debug!(unit, ?state, "unit not ready for a batch");
            }
            Err(e) => {
                let unit = unit.id();
                self.on_batch_failure(index, unit, e.to_string(), request);
            }
        }
    }

    fn handle(&mut self, Notification { unit, event }: Notification) {
        let Some(index) = self.slot_of(unit) else {
            tracing::debug!(unit, "notification from a replaced unit ignored");
            return;
        };

        match event {
            UnitEvent::Ready => {
                self.slots[index].init_deadline = None;
                self.emit(SessionEvent::Ready { unit });
                match self.slots[index].retry.take() {
                    Some(request) if self.stop.is_none() => {
                        tracing::info!(unit, iterations = request.iterations, "retrying batch");
                        self.submit(index, request);
                    }
                    _ => self.dispatch(index),
                }
            }
            UnitEvent::InitFailed { reason } => self.on_init_failed(index, reason),
            UnitEvent::NotReady { .. } => self.emit(SessionEvent::NotReady { unit }),
            UnitEvent::BatchResult { result, iterations } => {
                let slot = &mut self.slots[index];
                slot.in_flight = None;
                slot.failures = 0;
                self.record_attempts(iterations);

                if let Some(candidate) = result {
                    self.merge(unit, candidate);
                }
                self.update_stop();
                self.dispatch(index);
            }
            UnitEvent::BatchError { reason, completed } => {
                self.record_attempts(completed);
                let Some(in_flight) = self.slots[index].in_flight.take() else {
                    tracing::warn!(unit, %reason, "batch error without a batch in flight");
                    return;
                };
                self.on_batch_failure(index, unit, reason, in_flight.request);
            }
        }
    }

    /// The only place the best candidate changes.
    fn merge(&mut self, unit: UnitId, candidate: Candidate) {
        if self.best.merge(candidate) {
            self.stats.improvements.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(unit, score = candidate.score, "new best candidate");
            self.emit(SessionEvent::Progress {
                best: candidate,
                attempts: self.best.attempts(),
            });
        } else {
            tracing::debug!(unit, score = candidate.score, "candidate superseded");
        }
    }

    fn on_init_failed(&mut self, index: usize, reason: String) {
        let Some(unit) = self.slots[index].unit_id() else {
            return;
        };
        let error = UnitError::InitFailed { unit, reason };
        self.retire(index);
        self.report_init_failure(unit, error.to_string());
    }

    /// A unit that never became usable. Reported the same way whether its
    /// thread failed to spawn, its primitive failed to load, or loading timed out.
    fn report_init_failure(&self, unit: UnitId, reason: String) {
        tracing::warn!(unit, %reason, "search unit failed to initialize");
        self.emit(SessionEvent::InitFailed {
            unit,
            reason: reason.clone(),
        });
        self.emit_error(unit, reason);
    }

    /// First failure: restart the unit and replay the batch. Second in a row:
    /// retire it.
    fn on_batch_failure(&mut self, index: usize, unit: UnitId, reason: String, request: BatchRequest) {
        let error = UnitError::BatchError { unit, reason };
        let slot = &mut self.slots[index];
        slot.in_flight = None;
        slot.failures += 1;

        if slot.failures >= MAX_CONSECUTIVE_FAILURES {
            tracing::warn!(error = %error, failures = slot.failures, "retiring search unit");
            self.retire(index);
            self.emit_error(unit, error.to_string());
            return;
        }

        tracing::warn!(error = %error, "restarting search unit");
        let retry = self.replay(request);
        let init_deadline = Instant::now() + self.config.init_timeout;
        let replacement = self.spawn_unit();

        let slot = &mut self.slots[index];
        // Dropping the old unit detaches it if it is still stuck in a batch.
        match replacement {
            Ok(replacement) => {
                slot.unit = Some(replacement);
                slot.init_deadline = Some(init_deadline);
                slot.retry = retry;
                self.emit_error(unit, error.to_string());
            }
            Err(e) => {
                slot.unit = None;
                self.emit_error(unit, error.to_string());
                self.report_init_failure(e.unit(), e.to_string());
            }
        }
    }

    fn retire(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.unit = None;
        slot.in_flight = None;
        slot.retry = None;
        slot.init_deadline = None;
    }

    fn emit_error(&self, unit: UnitId, reason: String) {
        let continuing = self.usable_units() > 0;
        if !continuing {
            tracing::error!(unit, %reason, "last search unit lost");
        }
        self.emit(SessionEvent::Error {
            unit,
            reason,
            continuing,
        });
    }

    fn expire_inits(&mut self) {
        let now = Instant::now();
        for index in 0..self.slots.len() {
            let slot = &self.slots[index];
            let expired = slot.init_deadline.is_some_and(|d| now >= d)
                && slot
                    .unit
                    .as_ref()
                    .is_some_and(|u| u.state() == UnitState::Uninitialized);
            if expired {
                self.on_init_failed(index, "initialization timed out".into());
            }
        }
    }

    fn expire_batches(&mut self) {
        let now = Instant::now();
        for index in 0..self.slots.len() {
            let timed_out = self.slots[index]
                .in_flight
                .as_ref()
                .is_some_and(|f| f.deadline.is_some_and(|d| now >= d));
            if !timed_out {
                continue;
            }
            let Some(unit) = self.slots[index].unit_id() else {
                continue;
            };
            let Some(in_flight) = self.slots[index].in_flight.take() else {
                continue;
            };
            let reason = format!(
                "batch of {} did not finish within {:?}",
                in_flight.request.iterations,
                self.config.batch_timeout.unwrap_or_default()
            );
            self.on_batch_failure(index, unit, reason, in_flight.request);
        }
    }
}
