//! Pipeline state machine — explicit states and legal transition guards.
//!
//! Every run starts at `Init` and terminates at either `Done` (a complete
//! merged report exists) or `Aborted` (nothing is emitted). There is no
//! partial-completion state.
//!
//! ```text
//! Init → Bucketed → Dispatching → Merged → Done
//!                        │
//!                        └──────→ Aborted
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Messages received, nothing computed.
    Init,
    /// Messages partitioned into week buckets.
    Bucketed,
    /// Per-week classification tasks in flight.
    Dispatching,
    /// Week results merged into a report.
    Merged,
    /// Report handed back to the caller. Terminal.
    Done,
    /// A week exhausted its retries or the run was cancelled. Terminal.
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Bucketed => write!(f, "Bucketed"),
            Self::Dispatching => write!(f, "Dispatching"),
            Self::Merged => write!(f, "Merged"),
            Self::Done => write!(f, "Done"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

fn is_legal_transition(from: PipelineState, to: PipelineState) -> bool {
    use PipelineState::*;

    matches!(
        (from, to),
        (Init, Bucketed)
            | (Bucketed, Dispatching)
            | (Dispatching, Merged)
            | (Dispatching, Aborted)
            | (Merged, Done)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: PipelineState,
    pub to: PipelineState,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current pipeline state and the log of transitions taken.
#[derive(Debug)]
pub struct StateMachine {
    current: PipelineState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Init,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    /// Move to `to` if the edge exists in the state graph.
    pub fn advance(
        &mut self,
        to: PipelineState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, "State transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Transition to `Aborted`. Only legal while dispatching.
    pub fn abort(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(PipelineState::Aborted, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    /// One-line history, e.g. `Init → Done [Bucketed → Dispatching → Merged → Done]`.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!("{} → {}", PipelineState::Init, self.current);
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
