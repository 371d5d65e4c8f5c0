use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::{GovernError, Result};

/// Analysis lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookState {
    #[default]
    Idle,
    Analyzing,
    Error,
}

impl HookState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookState::Idle => "idle",
            HookState::Analyzing => "analyzing",
            HookState::Error => "error",
        }
    }
}

impl fmt::Display for HookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookEvent {
    /// idle -> analyzing
    Analyze,
    /// analyzing -> idle
    Success,
    /// analyzing -> error
    Error,
    /// error -> idle
    Reset,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Analyze => "analyze",
            HookEvent::Success => "success",
            HookEvent::Error => "error",
            HookEvent::Reset => "reset",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guards re-entrant analysis. Holds only the current state tag.
#[derive(Debug, Default)]
pub struct HookStateMachine {
    state: HookState,
}

impl HookStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HookState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == HookState::Idle
    }

    /// Apply an event. Illegal events return an error and leave the state untouched.
    pub fn transition(&mut self, event: HookEvent) -> Result<HookState> {
        let next = match (self.state, event) {
            (HookState::Idle, HookEvent::Analyze) => HookState::Analyzing,
            (HookState::Analyzing, HookEvent::Success) => HookState::Idle,
            (HookState::Analyzing, HookEvent::Error) => HookState::Error,
            (HookState::Error, HookEvent::Reset) => HookState::Idle,
            (state, event) => {
                warn!("Rejected hook transition '{}' from '{}'", event, state);
                return Err(GovernError::Transition {
                    state: state.to_string(),
                    event: event.to_string(),
                });
            }
        };

        debug!("Hook state {} -> {} ({})", self.state, next, event);
        self.state = next;
        Ok(next)
    }
}
