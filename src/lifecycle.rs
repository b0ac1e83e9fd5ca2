//! Host application lifecycle notifications.
//!
//! Sounds must go quiet when the application is suspended, put to sleep or
//! exits. Events reach the library through exactly one of two paths: a
//! callback installed into the host's notifier ([`AppletHook`]), or the
//! embedder forwarding each event by hand. The first path used is kept for
//! the lifetime of the context.

use std::fmt;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::backend::SharedBackend;
use crate::error::{CwavError, Result};
use crate::registry::Registry;

/// Lifecycle event of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppletEvent {
    /// The application lost focus.
    Suspend,
    /// The application regained focus.
    Restore,
    /// The console is going to sleep.
    Sleep,
    /// The console woke up.
    Wakeup,
    /// The application is closing.
    Exit,
}

impl AppletEvent {
    /// Whether all playback must stop on this event.
    pub fn stops_playback(self) -> bool {
        matches!(
            self,
            AppletEvent::Suspend | AppletEvent::Sleep | AppletEvent::Exit
        )
    }
}

/// Callback the library hands to the host notifier.
pub type AppletCallback = Box<dyn Fn(AppletEvent) + Send + Sync>;

/// Host notifier the library can install itself into.
pub trait AppletHook {
    /// Register `callback` to run on every lifecycle event.
    fn install(&mut self, callback: AppletCallback);
}

/// How lifecycle events reach the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPath {
    /// Through a callback installed with an [`AppletHook`].
    Hook,
    /// Forwarded event by event by the embedder.
    Forwarded,
}

impl fmt::Display for NotificationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationPath::Hook => f.write_str("installed hook"),
            NotificationPath::Forwarded => f.write_str("forwarded event"),
        }
    }
}

#[derive(Default)]
struct PathState {
    active: Option<NotificationPath>,
    warned_unnotified: bool,
}

/// Tracks which notification path is in use.
#[derive(Default)]
pub(crate) struct Lifecycle {
    state: Mutex<PathState>,
}

impl Lifecycle {
    /// Select `path`. Returns `Ok(true)` the first time, `Ok(false)` when it
    /// was already selected, and an error when the other path was.
    pub(crate) fn claim(&self, path: NotificationPath) -> Result<bool> {
        let mut state = self.state.lock();
        match state.active {
            None => {
                debug!("lifecycle notifications via {path}");
                state.active = Some(path);
                Ok(true)
            }
            Some(active) if active == path => Ok(false),
            Some(active) => {
                warn!("ignoring {path} notification, {active} path is active");
                Err(CwavError::NotificationPathConflict { active })
            }
        }
    }

    /// Path in use, if any.
    pub(crate) fn active(&self) -> Option<NotificationPath> {
        self.state.lock().active
    }

    /// Warn once when sounds get loaded with nothing listening for
    /// lifecycle events.
    pub(crate) fn warn_if_unnotified(&self) {
        let mut state = self.state.lock();
        if state.active.is_none() && !state.warned_unnotified {
            state.warned_unnotified = true;
            warn!("no lifecycle notification path is active; playback will not stop on suspend");
        }
    }
}

/// React to one event: stop every registered sound when required.
pub(crate) fn dispatch(event: AppletEvent, registry: &Registry, backend: &SharedBackend) {
    if event.stops_playback() {
        debug!("{event:?}: stopping all playback");
        registry.stop_all(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_suspend_sleep_and_exit_stop() {
        assert!(AppletEvent::Suspend.stops_playback());
        assert!(AppletEvent::Sleep.stops_playback());
        assert!(AppletEvent::Exit.stops_playback());
        assert!(!AppletEvent::Restore.stops_playback());
        assert!(!AppletEvent::Wakeup.stops_playback());
    }

    #[test]
    fn test_first_path_wins() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.active(), None);
        assert!(lifecycle.claim(NotificationPath::Forwarded).unwrap());
        assert!(!lifecycle.claim(NotificationPath::Forwarded).unwrap());
        match lifecycle.claim(NotificationPath::Hook) {
            Err(CwavError::NotificationPathConflict { active }) => {
                assert_eq!(active, NotificationPath::Forwarded)
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(lifecycle.active(), Some(NotificationPath::Forwarded));
    }
}
