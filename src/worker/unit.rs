//! A search unit: one worker thread running search batches on request.
//!
//! ```text
//! Uninitialized --init ok--> Ready --submit--> Busy --result--> Ready
//!       |                                        |
//!       +--init error--> Failed <--batch error---+
//! ```
//!
//! `Failed` is terminal. A unit never runs two batches at once: a request
//! made while it is anything but `Ready` is rejected, not queued.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::crypto::Primitive;
use crate::matcher::{Score, Scorer};
use crate::search::{Candidate, SaltPolicy, SearchLoop, Wallet};

pub type UnitId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Uninitialized,
    Ready,
    Busy,
    Failed,
}

/// Work for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub wallet: Wallet,
    pub iterations: u64,
    /// Score a result must strictly beat; `None` accepts anything.
    pub threshold: Option<Score>,
}

/// What a unit tells its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEvent {
    Ready,
    InitFailed { reason: String },
    NotReady { state: UnitState },
    BatchResult {
        result: Option<Candidate>,
        iterations: u64,
    },
    /// `completed` trials ran before the batch failed.
    BatchError { reason: String, completed: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub unit: UnitId,
    pub event: UnitEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("unit {unit} is not ready (state: {state:?})")]
    NotReady { unit: UnitId, state: UnitState },

    #[error("unit {unit} failed to initialize: {reason}")]
    InitFailed { unit: UnitId, reason: String },

    #[error("unit {unit} batch failed: {reason}")]
    BatchError { unit: UnitId, reason: String },

    #[error("failed to spawn unit {unit}: {source}")]
    Spawn {
        unit: UnitId,
        #[source]
        source: std::io::Error,
    },
}

impl UnitError {
    /// The unit the error is about.
    pub fn unit(&self) -> UnitId {
        match self {
            UnitError::NotReady { unit, .. }
            | UnitError::InitFailed { unit, .. }
            | UnitError::BatchError { unit, .. }
            | UnitError::Spawn { unit, .. } => *unit,
        }
    }
}

/// Everything the worker thread takes ownership of when it starts.
struct UnitContext {
    primitive: Arc<dyn Primitive>,
    scorer: Arc<dyn Scorer>,
    salts: SaltPolicy,
    requests: Receiver<BatchRequest>,
}

pub struct SearchUnit {
    id: UnitId,
    state: Arc<Mutex<UnitState>>,
    requests: Option<Sender<BatchRequest>>,
    events: Sender<Notification>,
    context: Option<UnitContext>,
    handle: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<UnitState>) -> MutexGuard<'_, UnitState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

impl SearchUnit {
    /// Creates an `Uninitialized` unit. Nothing runs until [`initialize`](Self::initialize).
    pub fn new(
        id: UnitId,
        primitive: Arc<dyn Primitive>,
        scorer: Arc<dyn Scorer>,
        salts: SaltPolicy,
        events: Sender<Notification>,
    ) -> Self {
        let (request_tx, request_rx) = unbounded();
        Self {
            id,
            state: Arc::new(Mutex::new(UnitState::Uninitialized)),
            requests: Some(request_tx),
            events,
            context: Some(UnitContext {
                primitive,
                scorer,
                salts,
                requests: request_rx,
            }),
            handle: None,
        }
    }

    /// Starts the worker thread, which loads the primitive and then reports
    /// `Ready` or `InitFailed`. Calling it again is a no-op.
    pub fn initialize(&mut self) -> Result<(), UnitError> {
        let Some(context) = self.context.take() else {
            return Ok(());
        };

        let id = self.id;
        let state = self.state.clone();
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name(format!("vanity-unit-{}", id))
            .spawn(move || run(id, context, state, events));

        match handle {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(source) => {
                *lock(&self.state) = UnitState::Failed;
                Err(UnitError::Spawn { unit: id, source })
            }
        }
    }

    /// Hands a batch to the unit. Fails with `NotReady` unless the unit is
    /// `Ready`; the rejection is also sent as a notification.
    pub fn submit_batch(&self, request: BatchRequest) -> Result<(), UnitError> {
        let mut state = lock(&self.state);
        if *state != UnitState::Ready {
            let current = *state;
            drop(state);
            let _ = self.events.send(Notification {
                unit: self.id,
                event: UnitEvent::NotReady { state: current },
            });
            return Err(UnitError::NotReady {
                unit: self.id,
                state: current,
            });
        }

        let sent = self
            .requests
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok());
        if !sent {
            *state = UnitState::Failed;
            return Err(UnitError::BatchError {
                unit: self.id,
                reason: "worker thread is gone".into(),
            });
        }
        *state = UnitState::Busy;
        Ok(())
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn state(&self) -> UnitState {
        *lock(&self.state)
    }
}

impl Drop for SearchUnit {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            // A busy or still-loading unit may never return; leave it detached.
            if matches!(self.state(), UnitState::Ready | UnitState::Failed) {
                let _ = handle.join();
            }
        }
    }
}

fn run(id: UnitId, context: UnitContext, state: Arc<Mutex<UnitState>>, events: Sender<Notification>) {
    let UnitContext {
        primitive,
        scorer,
        salts,
        requests,
    } = context;

    let notify = |event: UnitEvent| {
        let _ = events.send(Notification { unit: id, event });
    };

    let init = panic::catch_unwind(AssertUnwindSafe(|| primitive.initialize()))
        .map_err(panic_message)
        .and_then(|r| r.map_err(|e| e.to_string()));
    if let Err(reason) = init {
        *lock(&state) = UnitState::Failed;
        notify(UnitEvent::InitFailed { reason });
        return;
    }
    *lock(&state) = UnitState::Ready;
    notify(UnitEvent::Ready);

    let mut search = SearchLoop::new(primitive, scorer, salts.source());

    for request in requests.iter() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            search.search(&request.wallet, request.iterations, request.threshold)
        }))
        .map_err(panic_message)
        .and_then(|r| r.map_err(|e| e.to_string()));

        match outcome {
            Ok(result) => {
                // Ready before notifying, so the owner can resubmit at once.
                *lock(&state) = UnitState::Ready;
                notify(UnitEvent::BatchResult {
                    result,
                    iterations: request.iterations,
                });
            }
            Err(reason) => {
                *lock(&state) = UnitState::Failed;
                notify(UnitEvent::BatchError {
                    reason,
                    completed: search.completed(),
                });
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::search::testing::{FirstByteScorer, GatedPrimitive, ScriptedPrimitive};

    const WAIT: Duration = Duration::from_secs(5);

    fn wallet() -> Wallet {
        Wallet::new(b"W".to_vec()).unwrap()
    }

    fn request(iterations: u64, threshold: Option<Score>) -> BatchRequest {
        BatchRequest {
            wallet: wallet(),
            iterations,
            threshold,
        }
    }

    fn unit_with(primitive: impl Primitive) -> (SearchUnit, Receiver<Notification>) {
        let (tx, rx) = unbounded();
        let unit = SearchUnit::new(
            7,
            Arc::new(primitive),
            Arc::new(FirstByteScorer),
            SaltPolicy::Sequential,
            tx,
        );
        (unit, rx)
    }

    fn next_event(rx: &Receiver<Notification>) -> UnitEvent {
        let n = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(n.unit, 7);
        n.event
    }

    #[test]
    fn test_rejects_batches_before_init() {
        let (unit, rx) = unit_with(ScriptedPrimitive::new(vec![1]));
        assert_eq!(unit.state(), UnitState::Uninitialized);
        let err = unit.submit_batch(request(1, None)).unwrap_err();
        assert!(matches!(
            err,
            UnitError::NotReady {
                unit: 7,
                state: UnitState::Uninitialized
            }
        ));
        assert_eq!(
            next_event(&rx),
            UnitEvent::NotReady {
                state: UnitState::Uninitialized
            }
        );
    }

    #[test]
    fn test_ready_then_batch_then_ready() {
        let (mut unit, rx) = unit_with(ScriptedPrimitive::new(vec![0, 1, 3, 2, 0]));
        unit.initialize().unwrap();
        unit.initialize().unwrap();
        assert_eq!(next_event(&rx), UnitEvent::Ready);
        assert_eq!(unit.state(), UnitState::Ready);

        unit.submit_batch(request(5, None)).unwrap();
        match next_event(&rx) {
            UnitEvent::BatchResult { result, iterations } => {
                assert_eq!(iterations, 5);
                assert_eq!(result.unwrap().score, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(unit.state(), UnitState::Ready);

        unit.submit_batch(request(5, Some(3))).unwrap();
        assert_eq!(
            next_event(&rx),
            UnitEvent::BatchResult {
                result: None,
                iterations: 5
            }
        );
    }

    #[test]
    fn test_second_batch_rejected_while_busy() {
        let (gate_tx, gate_rx) = unbounded();
        let (mut unit, rx) = unit_with(GatedPrimitive { gate: gate_rx });
        unit.initialize().unwrap();
        assert_eq!(next_event(&rx), UnitEvent::Ready);

        unit.submit_batch(request(1, None)).unwrap();
        assert_eq!(unit.state(), UnitState::Busy);
        assert!(matches!(
            unit.submit_batch(request(1, None)),
            Err(UnitError::NotReady {
                state: UnitState::Busy,
                ..
            })
        ));
        assert_eq!(
            next_event(&rx),
            UnitEvent::NotReady {
                state: UnitState::Busy
            }
        );

        gate_tx.send(()).unwrap();
        assert!(matches!(next_event(&rx), UnitEvent::BatchResult { .. }));
        assert_eq!(unit.state(), UnitState::Ready);
    }

    #[test]
    fn test_init_failure_is_terminal() {
        let mut primitive = ScriptedPrimitive::new(vec![1]);
        primitive.fail_init = true;
        let (mut unit, rx) = unit_with(primitive);
        unit.initialize().unwrap();
        assert!(matches!(next_event(&rx), UnitEvent::InitFailed { .. }));
        assert_eq!(unit.state(), UnitState::Failed);
        unit.initialize().unwrap();
        assert_eq!(unit.state(), UnitState::Failed);
        assert!(unit.submit_batch(request(1, None)).is_err());
    }

    #[test]
    fn test_batch_error_fails_unit() {
        let primitive = ScriptedPrimitive::new(vec![1]);
        *primitive.fail_batches.lock().unwrap() = 1;
        let (mut unit, rx) = unit_with(primitive);
        unit.initialize().unwrap();
        assert_eq!(next_event(&rx), UnitEvent::Ready);

        unit.submit_batch(request(3, None)).unwrap();
        assert!(matches!(
            next_event(&rx),
            UnitEvent::BatchError { completed: 0, .. }
        ));
        assert_eq!(unit.state(), UnitState::Failed);
        assert!(matches!(
            unit.submit_batch(request(3, None)),
            Err(UnitError::NotReady {
                state: UnitState::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_panic_becomes_batch_error() {
        let mut primitive = ScriptedPrimitive::new(vec![1]);
        primitive.panic_on_derive = true;
        let (mut unit, rx) = unit_with(primitive);
        unit.initialize().unwrap();
        assert_eq!(next_event(&rx), UnitEvent::Ready);

        unit.submit_batch(request(1, None)).unwrap();
        match next_event(&rx) {
            UnitEvent::BatchError { reason, completed } => {
                assert!(reason.contains("scripted panic"));
                assert_eq!(completed, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(unit.state(), UnitState::Failed);
    }
}
