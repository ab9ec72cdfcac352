//! Optional outbound "now playing" status.
//!
//! Reporting is best-effort: implementations swallow their own failures and
//! never block the caller.

#[cfg(feature = "discord")]
mod discord;

use std::time::Duration;

use tracing::debug;

#[cfg(feature = "discord")]
pub use discord::DiscordPresence;

/// What the user is currently doing, at the granularity shared externally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceState {
    /// Looking at one of the screens without an active session.
    Browsing {
        /// Title of the visible screen.
        screen: String,
    },
    /// A session is running or paused.
    Playing {
        /// Game being tracked.
        game: String,
        /// Running time so far.
        elapsed: Duration,
        /// Whether the timer is paused.
        paused: bool,
    },
    /// Nothing should be shown.
    Cleared,
}

impl PresenceState {
    /// Whether two states would render the same. Elapsed time is excluded since
    /// clients derive it from the start timestamp.
    fn same_display(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Playing {
                    game: a, paused: pa, ..
                },
                Self::Playing {
                    game: b, paused: pb, ..
                },
            ) => a == b && pa == pb,
            _ => self == other,
        }
    }
}

/// A destination for presence updates (Discord, tests, ...).
pub trait PresenceReporter: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Publish the state. Must not block and must not fail loudly.
    fn report(&mut self, state: &PresenceState);
}

/// Reporter that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresence;

impl PresenceReporter for NoopPresence {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn report(&mut self, _state: &PresenceState) {}
}

/// Front for a reporter that honours the user's on/off preference and skips
/// repeated states.
pub struct Presence {
    reporter: Box<dyn PresenceReporter>,
    enabled: bool,
    last: Option<PresenceState>,
}

impl Presence {
    /// Wrap `reporter`, starting enabled or not.
    pub fn new(reporter: Box<dyn PresenceReporter>, enabled: bool) -> Self {
        Self {
            reporter,
            enabled,
            last: None,
        }
    }

    /// Presence that never reports anything.
    pub fn disabled() -> Self {
        Self::new(Box::new(NoopPresence), false)
    }

    /// Whether updates are forwarded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Name of the wrapped reporter.
    pub fn reporter_name(&self) -> &'static str {
        self.reporter.name()
    }

    /// Switch reporting on or off. Turning it off clears the external status.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        if !enabled {
            self.reporter.report(&PresenceState::Cleared);
        }
        self.enabled = enabled;
        self.last = None;
        debug!(reporter = self.reporter.name(), enabled, "Presence toggled");
    }

    /// Forward `state` unless disabled or unchanged.
    pub fn update(&mut self, state: PresenceState) {
        if !self.enabled {
            return;
        }
        if self
            .last
            .as_ref()
            .is_some_and(|last| last.same_display(&state))
        {
            return;
        }
        self.reporter.report(&state);
        self.last = Some(state);
    }

    /// Clear the external status, e.g. before exiting.
    pub fn clear(&mut self) {
        self.update(PresenceState::Cleared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<PresenceState>>>);

    impl PresenceReporter for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn report(&mut self, state: &PresenceState) {
            self.0.lock().unwrap().push(state.clone());
        }
    }

    fn playing(secs: u64, paused: bool) -> PresenceState {
        PresenceState::Playing {
            game: "Hades".to_string(),
            elapsed: Duration::from_secs(secs),
            paused,
        }
    }

    #[test]
    fn repeated_states_are_sent_once() {
        let recorder = Recorder::default();
        let mut presence = Presence::new(Box::new(recorder.clone()), true);
        presence.update(playing(1, false));
        presence.update(playing(2, false));
        presence.update(playing(3, true));
        presence.clear();
        presence.clear();
        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2], PresenceState::Cleared);
    }

    #[test]
    fn disabled_presence_reports_nothing() {
        let recorder = Recorder::default();
        let mut presence = Presence::new(Box::new(recorder.clone()), false);
        presence.update(playing(1, false));
        assert!(recorder.0.lock().unwrap().is_empty());

        presence.set_enabled(true);
        presence.update(playing(1, false));
        presence.set_enabled(false);
        presence.update(PresenceState::Browsing {
            screen: "Library".to_string(),
        });
        let sent = recorder.0.lock().unwrap();
        assert_eq!(*sent, vec![playing(1, false), PresenceState::Cleared]);
    }
}
