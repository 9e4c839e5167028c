//! State-change observers

use super::State;
use crate::Error;
use std::sync::Mutex;
use tokio::sync::watch;

/// Notified on every engine state transition
pub trait StateChangedListener: Send + Sync {
    /// Called after each transition, outside the engine lock
    fn on_state_changed(&self, old: State, new: State);

    /// Called with the fatal error right before the transition to `Failed`
    fn on_error(&self, _error: &Error) {}
}

/// Listener that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl StateChangedListener for NoopListener {
    fn on_state_changed(&self, _old: State, _new: State) {}
}

/// Listener that lets async callers wait for a terminal state
pub struct StateWatcher {
    state: watch::Sender<State>,
    error: Mutex<Option<Error>>,
}

impl StateWatcher {
    pub fn new() -> Self {
        let (state, _) = watch::channel(State::Init);
        Self {
            state,
            error: Mutex::new(None),
        }
    }

    /// Last observed state
    pub fn current(&self) -> State {
        *self.state.borrow()
    }

    /// The fatal error, if the protocol failed
    pub fn error(&self) -> Option<Error> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    /// Wait until the protocol is done or failed
    pub async fn wait_terminal(&self) -> State {
        let mut rx = self.state.subscribe();
        // The sender lives in self, so the channel cannot close here
        let state = rx
            .wait_for(|s| s.is_terminal())
            .await
            .map(|state| *state)
            .unwrap_or_else(|_| self.current());
        state
    }
}

impl Default for StateWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StateChangedListener for StateWatcher {
    fn on_state_changed(&self, _old: State, new: State) {
        self.state.send_replace(new);
    }

    fn on_error(&self, error: &Error) {
        if let Ok(mut slot) = self.error.lock() {
            *slot = Some(error.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_wakes_on_terminal_state() {
        let watcher = std::sync::Arc::new(StateWatcher::new());
        let waiter = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.wait_terminal().await })
        };

        watcher.on_state_changed(State::Init, State::Running);
        watcher.on_error(&Error::InconsistentPublicKey);
        watcher.on_state_changed(State::Running, State::Failed);

        assert_eq!(waiter.await.unwrap(), State::Failed);
        assert_eq!(watcher.error(), Some(Error::InconsistentPublicKey));
    }

    #[tokio::test]
    async fn test_wait_returns_at_once_when_already_terminal() {
        let watcher = StateWatcher::new();
        watcher.on_state_changed(State::Running, State::Done);

        let state = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            watcher.wait_terminal(),
        )
        .await
        .unwrap();
        assert_eq!(state, State::Done);
        assert_eq!(watcher.error(), None);
    }
}
