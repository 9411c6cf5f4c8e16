//! Session lifecycle (`spec.md` §4.1): CONNECTING → CONNECTED → EXPIRED.

use tokio::sync::watch;

/// A coordination-store session's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Expired,
}

/// Lets callers observe session-state transitions without polling.
#[derive(Clone)]
pub struct SessionWatch {
    rx: watch::Receiver<SessionState>,
}

impl SessionWatch {
    pub(crate) fn new(rx: watch::Receiver<SessionState>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> SessionState {
        *self.rx.borrow()
    }

    /// Waits until the session reaches `Expired`. Resolves immediately if
    /// it already has.
    pub async fn wait_for_expiry(&mut self) {
        if self.current() == SessionState::Expired {
            return;
        }
        let _ = self
            .rx
            .wait_for(|s| *s == SessionState::Expired)
            .await;
    }
}

pub(crate) fn channel() -> (watch::Sender<SessionState>, SessionWatch) {
    let (tx, rx) = watch::channel(SessionState::Connected);
    (tx, SessionWatch::new(rx))
}
