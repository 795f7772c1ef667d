//! The scheduler's own little state machine.

use std::cell::Cell;

/// What the behaviour scheduler is currently doing.
///
/// Only `Running` and its sub-activities (`Evaluating`, `Dispatching`) let
/// `update`/`trigger`/`send_event` have effect. `Starting` and `Stopping`
/// mark the windows in which enter/exit callbacks run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
    Evaluating,
    Dispatching,
}

pub(crate) struct PhaseCell {
    phase: Cell<Phase>,
}

impl PhaseCell {
    pub fn new() -> Self {
        PhaseCell {
            phase: Cell::new(Phase::Idle),
        }
    }

    pub fn get(&self) -> Phase {
        self.phase.get()
    }

    pub fn set(&self, phase: Phase) {
        self.phase.set(phase);
    }

    /// Swap to a sub-activity phase for the lifetime of the returned guard.
    /// The prior phase is restored on drop, on every exit path.
    pub fn activity(&self, phase: Phase) -> PhaseGuard<'_> {
        let prior = self.phase.replace(phase);
        PhaseGuard { cell: self, prior }
    }

    /// Running covers the whole started lifetime except the exit window: a
    /// stopping machine already reads as not running, matching the rule that
    /// `CurrentState` is present iff the machine runs.
    pub fn is_running(&self) -> bool {
        matches!(
            self.phase.get(),
            Phase::Starting | Phase::Running | Phase::Evaluating | Phase::Dispatching
        )
    }
}

pub(crate) struct PhaseGuard<'a> {
    cell: &'a PhaseCell,
    prior: Phase,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.cell.phase.set(self.prior);
    }
}
