//! Authentication latch for one connection.

use tokio::sync::watch;

use crate::errors::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Open,
    Failed(BridgeError),
}

/// Single-flight latch that every RPC on a connection waits on.
///
/// The latch settles at most once: the first `open` or `fail` wins and later
/// transitions are ignored.
#[derive(Debug)]
pub struct AuthGate {
    state: watch::Sender<GateState>,
}

impl AuthGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Pending);
        Self { state }
    }

    pub fn open(&self) -> bool {
        self.transition(GateState::Open)
    }

    pub fn fail(&self, error: BridgeError) -> bool {
        self.transition(GateState::Failed(error))
    }

    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), GateState::Pending)
    }

    pub async fn wait(&self) -> Result<(), BridgeError> {
        let mut updates = self.state.subscribe();
        let settled = updates
            .wait_for(|state| !matches!(state, GateState::Pending))
            .await
            .map_err(|_| BridgeError::unavailable("authentication gate dropped"))?
            .clone();

        match settled {
            GateState::Failed(error) => Err(error),
            GateState::Open | GateState::Pending => Ok(()),
        }
    }

    fn transition(&self, next: GateState) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, GateState::Pending) {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

impl Default for AuthGate {
    fn default() -> Self {
        Self::new()
    }
}
