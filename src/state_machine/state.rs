use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::job::Job;
use crate::runner::Termination;

/// Lifecycle of one job.
///
/// `Discovered → ConfigResolved → Dispatched → Running → {Completed, TimedOut, Cancelled, Crashed}`,
/// or `Discovered → ConfigUnavailable`. A resolved job that is never dispatched because
/// the run was cancelled goes straight to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Discovered,
    ConfigResolved,
    ConfigUnavailable,
    Dispatched,
    Running,
    Completed,
    TimedOut,
    Cancelled,
    Crashed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Discovered => write!(f, "DISCOVERED"),
            JobState::ConfigResolved => write!(f, "CONFIG_RESOLVED"),
            JobState::ConfigUnavailable => write!(f, "CONFIG_UNAVAILABLE"),
            JobState::Dispatched => write!(f, "DISPATCHED"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::TimedOut => write!(f, "TIMED_OUT"),
            JobState::Cancelled => write!(f, "CANCELLED"),
            JobState::Crashed => write!(f, "CRASHED"),
        }
    }
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::ConfigUnavailable
                | JobState::Completed
                | JobState::TimedOut
                | JobState::Cancelled
                | JobState::Crashed
        )
    }

    fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Discovered, ConfigResolved)
                | (Discovered, ConfigUnavailable)
                | (ConfigResolved, Dispatched)
                | (ConfigResolved, Cancelled)
                | (Dispatched, Running)
                | (Dispatched, Cancelled)
                | (Dispatched, Crashed)
                | (Running, Completed)
                | (Running, TimedOut)
                | (Running, Cancelled)
                | (Running, Crashed)
        )
    }

    /// Terminal state reached when the engine process ends the given way.
    pub fn after(termination: &Termination) -> JobState {
        match termination {
            Termination::Exited { .. } => JobState::Completed,
            Termination::TimedOut(_) => JobState::TimedOut,
            Termination::Cancelled => JobState::Cancelled,
            Termination::SpawnFailed(_) | Termination::WaitFailed(_) => JobState::Crashed,
        }
    }
}

/// The result of requesting a state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Next(JobState),
    /// The move is not part of the lifecycle; the job keeps its state.
    Rejected { from: JobState, to: JobState },
}

/// Drives a `Job` through its lifecycle.
pub struct StateMachine;

impl StateMachine {
    /// Moves `job` to `next` if the lifecycle allows it, recording the previous state.
    pub fn advance(job: &mut Job, next: JobState) -> Transition {
        if !job.state.can_advance_to(next) {
            warn!(identity = %job.identity, from = %job.state, to = %next, "rejected job transition");
            return Transition::Rejected {
                from: job.state,
                to: next,
            };
        }
        job.state_history.push(job.state);
        job.state = next;
        Transition::Next(next)
    }
}
