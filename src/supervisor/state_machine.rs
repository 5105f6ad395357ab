use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of the supervised server.
///
/// There is no `Stopping` state: a graceful stop only writes `stop` to the
/// console and the exit watcher moves the server back to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(ServerState, ServerState),
}

pub struct StateMachine {
    pub state: ServerState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: ServerState::Stopped }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: ServerState) -> bool {
        matches!(
            (self.state, to),
            (ServerState::Stopped, ServerState::Starting)
                | (ServerState::Starting, ServerState::Running)
                // spawn failed
                | (ServerState::Starting, ServerState::Stopped)
                // exit observed, whatever the cause
                | (ServerState::Running, ServerState::Stopped)
        )
    }

    pub fn transition(&mut self, to: ServerState) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            tracing::debug!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}
