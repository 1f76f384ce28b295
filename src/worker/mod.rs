//! Search units and the coordinator that runs them as a pool.
//!
//! This module provides:
//! - [`SearchUnit`]: one worker thread with a ready/busy/failed state machine
//! - [`Coordinator`]: dispatch, result merging, stopping and failure handling

mod coordinator;
mod unit;

pub use coordinator::{
    Coordinator, Session, SessionConfig, SessionError, SessionEvent, SessionOutcome, SessionStats,
    StopReason,
};
pub use unit::{
    BatchRequest, Notification, SearchUnit, UnitError, UnitEvent, UnitId, UnitState,
};
