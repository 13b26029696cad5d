//! Stream access gate
//!
//! Serializes the calls a stream makes toward its port so that no frame
//! processing or component call races a lifecycle transition.
//!
//! Every call registers the calling thread under one of three categories:
//!
//! - **State**: open/close/start/stop. Waits until no other thread that
//!   registered earlier holds a State or Component slot.
//! - **Internal**: frame handling. Never waits, but is refused with `Aborted`
//!   when a state change toward a detached state (Init/NotInit) is in flight
//!   on another thread.
//! - **Component**: property and component calls. Same admission rule as
//!   Internal; State callers wait for it.
//!
//! A thread that already holds a slot of any category passes straight
//! through, so a state change may call back into frame handling on the same
//! thread.

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use super::state::StreamLocalState;
use crate::error::{Error, Result};

/// Category of a gated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCategory {
    /// Lifecycle transition
    State,
    /// Internal frame processing
    Internal,
    /// Call routed into the component's property surface
    Component,
}

#[derive(Debug, Clone, Copy)]
struct RunningFunction {
    thread: ThreadId,
    category: FunctionCategory,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    current: StreamLocalState,
    dest: StreamLocalState,
}

impl Transition {
    fn latest(&self) -> StreamLocalState {
        if self.current == self.dest {
            self.current
        } else {
            self.dest
        }
    }
}

/// Admission gate plus lifecycle state of one stream
#[derive(Debug)]
pub struct StreamAccessGate {
    running: Mutex<Vec<RunningFunction>>,
    cond: Condvar,
    transition: Mutex<Transition>,
}

impl Default for StreamAccessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccessGate {
    /// Create a gate in the `NotInit` state with no calls in flight
    pub fn new() -> Self {
        Self {
            running: Mutex::new(Vec::new()),
            cond: Condvar::new(),
            transition: Mutex::new(Transition {
                current: StreamLocalState::NotInit,
                dest: StreamLocalState::NotInit,
            }),
        }
    }

    /// Register the calling thread for a call of the given category
    ///
    /// State calls may block. The slot is released when the guard drops.
    pub fn lock(&self, category: FunctionCategory) -> Result<GateGuard<'_>> {
        let thread = thread::current().id();
        let mut running = self.running.lock();

        if running.iter().any(|f| f.thread == thread) {
            return Ok(GateGuard::reentrant(self));
        }
        running.push(RunningFunction { thread, category });

        match category {
            FunctionCategory::State => loop {
                let blocked = running
                    .iter()
                    .take_while(|f| f.thread != thread)
                    .any(|f| f.category != FunctionCategory::Internal);
                if !blocked {
                    break;
                }
                self.cond.wait(&mut running);
            },
            FunctionCategory::Internal | FunctionCategory::Component => {
                let changing = running
                    .iter()
                    .take_while(|f| f.thread != thread)
                    .any(|f| f.category == FunctionCategory::State);
                if changing && !self.transition.lock().dest.is_attached() {
                    remove_thread(&mut running, thread);
                    self.cond.notify_all();
                    return Err(Error::aborted("invalid state(closing stream)."));
                }
            }
        }

        Ok(GateGuard {
            gate: self,
            registered: true,
            _thread_bound: PhantomData,
        })
    }

    fn unlock(&self) {
        let mut running = self.running.lock();
        remove_thread(&mut running, thread::current().id());
        self.cond.notify_all();
    }

    /// Whether a thread other than the caller holds a slot
    pub fn is_another_thread_accessing(&self) -> bool {
        let thread = thread::current().id();
        self.running.lock().iter().any(|f| f.thread != thread)
    }

    /// Block until no other thread holds a slot
    pub fn wait_all_access_done(&self) {
        let thread = thread::current().id();
        let mut running = self.running.lock();
        while running.iter().any(|f| f.thread != thread) {
            self.cond.wait(&mut running);
        }
    }

    /// Block until no other thread holds a slot of `category`
    pub fn wait_access_done(&self, category: FunctionCategory) {
        let thread = thread::current().id();
        let mut running = self.running.lock();
        while running
            .iter()
            .any(|f| f.thread != thread && f.category == category)
        {
            self.cond.wait(&mut running);
        }
    }

    /// Committed lifecycle state
    pub fn local_state(&self) -> StreamLocalState {
        self.transition.lock().current
    }

    /// Committed lifecycle state and whether a change is in flight
    pub fn local_state_with_progress(&self) -> (StreamLocalState, bool) {
        let transition = self.transition.lock();
        (transition.current, transition.current != transition.dest)
    }

    /// Start a transition to `state`
    ///
    /// The edge is checked against the most recent target, so a change
    /// begun while another is uncommitted builds on the pending target.
    pub fn begin_state_change(&self, state: StreamLocalState) -> Result<()> {
        let mut transition = self.transition.lock();
        let latest = transition.latest();
        if !latest.can_transition_to(state) {
            return Err(Error::invalid_operation(format!(
                "invalid set state({} -> {})",
                latest, state
            )));
        }
        transition.current = latest;
        transition.dest = state;
        Ok(())
    }

    /// Make the pending target the committed state
    pub fn commit_state_change(&self) {
        let mut transition = self.transition.lock();
        transition.current = transition.dest;
    }

    /// Abandon the pending target
    pub fn cancel_state_change(&self) {
        let mut transition = self.transition.lock();
        transition.dest = transition.current;
    }
}

fn remove_thread(running: &mut Vec<RunningFunction>, thread: ThreadId) {
    if let Some(pos) = running.iter().position(|f| f.thread == thread) {
        running.remove(pos);
    }
}

/// Slot held in a [`StreamAccessGate`]
///
/// Bound to the thread that acquired it.
#[must_use = "the slot is released when the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a StreamAccessGate,
    registered: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl<'a> GateGuard<'a> {
    fn reentrant(gate: &'a StreamAccessGate) -> Self {
        Self {
            gate,
            registered: false,
            _thread_bound: PhantomData,
        }
    }

    /// Whether this guard owns the slot (false for a re-entrant acquisition)
    pub fn is_registered(&self) -> bool {
        self.registered
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if self.registered {
            self.gate.unlock();
        }
    }
}
