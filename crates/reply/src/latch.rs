//! The transmission state machine.
//!
//! ```text
//! Idle -> HeadersSent -> Streaming -> Completed
//!   \          \             \-----> Aborted
//!    \----------\------------------> Errored
//! ```
//!
//! Forward steps are taken by the transmitting task only. Terminal transitions may race
//! (payload error, peer abort, socket close, normal finish); the latch lets exactly one
//! of them through.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Idle = 0,
    HeadersSent = 1,
    Streaming = 2,
    Completed = 3,
    Aborted = 4,
    Errored = 5,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => State::Idle,
            1 => State::HeadersSent,
            2 => State::Streaming,
            3 => State::Completed,
            4 => State::Aborted,
            _ => State::Errored,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Aborted | State::Errored)
    }
}

#[derive(Debug)]
pub(crate) struct Latch {
    state: AtomicU8,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Self { state: AtomicU8::new(State::Idle as u8) }
    }

    pub(crate) fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves one step forward from `from`; fails when the machine is elsewhere, in
    /// particular when it already terminated.
    pub(crate) fn advance(&self, from: State, to: State) -> bool {
        debug_assert!(!from.is_terminal() && !to.is_terminal());
        self.state.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Enters the terminal state `to`. Only the first caller wins.
    pub(crate) fn terminate(&self, to: State) -> bool {
        debug_assert!(to.is_terminal());
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if State::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange_weak(current, to as u8, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}
