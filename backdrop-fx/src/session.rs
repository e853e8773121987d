//! Observable capture session lifecycle.

use crate::error::SessionError;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// Not resolved yet.
    Unknown,
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub permission: PermissionState,
    pub running: bool,
    /// Set when the session can no longer produce frames.
    pub offline: Option<SessionError>,
}

impl SessionSnapshot {
    /// "Live" / "Offline" status label for a UI.
    pub fn label(&self) -> &'static str {
        if self.running {
            "Live"
        } else {
            "Offline"
        }
    }
}

/// Session state shared between the capture thread and readers.
#[derive(Debug)]
pub struct SessionState {
    inner: RwLock<SessionSnapshot>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SessionSnapshot {
                permission: PermissionState::Unknown,
                running: false,
                offline: None,
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.read().running
    }

    pub fn offline_reason(&self) -> Option<SessionError> {
        self.inner.read().offline.clone()
    }

    pub(crate) fn set_permission(&self, granted: bool) {
        self.inner.write().permission = if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
    }

    pub(crate) fn mark_running(&self) {
        let mut inner = self.inner.write();
        inner.running = true;
        inner.offline = None;
    }

    pub(crate) fn mark_stopped(&self) {
        self.inner.write().running = false;
    }

    pub(crate) fn go_offline(&self, reason: SessionError) {
        tracing::warn!("Session offline: {}", reason);
        let mut inner = self.inner.write();
        inner.running = false;
        inner.offline = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown_and_not_running() {
        let state = SessionState::new();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.permission, PermissionState::Unknown);
        assert!(!snapshot.running);
        assert_eq!(snapshot.label(), "Offline");
    }

    #[test]
    fn offline_clears_running() {
        let state = SessionState::new();
        state.set_permission(true);
        state.mark_running();
        assert_eq!(state.snapshot().label(), "Live");

        state.go_offline(SessionError::DeviceUnavailable("unplugged".into()));
        assert!(!state.is_running());
        assert_eq!(
            state.offline_reason(),
            Some(SessionError::DeviceUnavailable("unplugged".into()))
        );
    }
}
