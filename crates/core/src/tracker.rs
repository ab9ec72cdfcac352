//! Process-wide tracking context holding at most one active session.

use std::time::Duration;

use tracing::{debug, info};

use crate::{
    error::TrackError,
    models::Session,
    timer::{Clock, SessionTimer, SystemClock, TimerStatus},
};

/// A stopped session together with the game it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSession {
    /// Game the session was tracked for.
    pub game: String,
    /// The finalized session.
    pub session: Session,
}

struct Active {
    game: String,
    timer: SessionTimer,
}

/// Owner of the single active timer.
///
/// Created once at startup and handed to whoever drives the UI. Starting a
/// second session while one is running or paused is rejected with
/// [`TrackError::AlreadyTracking`]; the active session is left untouched.
pub struct Tracker<C: Clock = SystemClock> {
    clock: C,
    active: Option<Active>,
}

impl Tracker<SystemClock> {
    /// Tracker using the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Tracker<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Tracker<C> {
    /// Tracker sampling time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            active: None,
        }
    }

    /// Game of the running or paused session.
    pub fn active_game(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.game.as_str())
    }

    /// Status of the active timer, `Idle` when nothing is tracked.
    pub fn status(&self) -> TimerStatus {
        self.active
            .as_ref()
            .map(|active| active.timer.status())
            .unwrap_or(TimerStatus::Idle)
    }

    /// Elapsed running time of the active session.
    pub fn elapsed(&self) -> Option<Duration> {
        let now = self.clock.sample().instant;
        self.active.as_ref().map(|active| active.timer.elapsed(now))
    }

    /// Start a session for `game`. Fails while another session is active.
    pub fn start(&mut self, game: &str) -> Result<(), TrackError> {
        if let Some(active) = &self.active {
            return Err(TrackError::AlreadyTracking {
                game: active.game.clone(),
            });
        }
        let mut timer = SessionTimer::new();
        timer.start(self.clock.sample())?;
        info!(game, "Session started");
        self.active = Some(Active {
            game: game.to_string(),
            timer,
        });
        Ok(())
    }

    /// Pause the running session.
    pub fn pause(&mut self) -> Result<(), TrackError> {
        let sample = self.clock.sample();
        let active = self.active.as_mut().ok_or(TrackError::NotTracking)?;
        active.timer.pause(sample)?;
        debug!(game = %active.game, "Session paused");
        Ok(())
    }

    /// Resume the paused session.
    pub fn resume(&mut self) -> Result<(), TrackError> {
        let sample = self.clock.sample();
        let active = self.active.as_mut().ok_or(TrackError::NotTracking)?;
        active.timer.resume(sample)?;
        debug!(game = %active.game, "Session resumed");
        Ok(())
    }

    /// Pause a running session or resume a paused one.
    pub fn toggle_pause(&mut self) -> Result<TimerStatus, TrackError> {
        match self.status() {
            TimerStatus::Running => self.pause()?,
            TimerStatus::Paused => self.resume()?,
            _ => return Err(TrackError::NotTracking),
        }
        Ok(self.status())
    }

    /// Stop the active session and release the tracking slot.
    pub fn stop(&mut self) -> Result<FinishedSession, TrackError> {
        let sample = self.clock.sample();
        let mut active = self.active.take().ok_or(TrackError::NotTracking)?;
        let session = match active.timer.stop(sample) {
            Ok(session) => session,
            Err(err) => {
                self.active = Some(active);
                return Err(err.into());
            }
        };
        info!(game = %active.game, elapsed_secs = session.elapsed_secs, "Session stopped");
        Ok(FinishedSession {
            game: active.game,
            session,
        })
    }

    /// Stop whatever is active so it can be persisted before exit.
    pub fn shutdown(&mut self) -> Option<FinishedSession> {
        self.stop().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::TimerError, timer::tests::ManualClock};

    #[test]
    fn start_while_active_fails_and_keeps_original() {
        let clock = ManualClock::new();
        let mut tracker = Tracker::with_clock(clock.clone());
        tracker.start("Hades").unwrap();
        clock.advance(20);

        assert_eq!(
            tracker.start("Celeste"),
            Err(TrackError::AlreadyTracking {
                game: "Hades".to_string()
            })
        );
        assert_eq!(tracker.active_game(), Some("Hades"));

        tracker.pause().unwrap();
        assert!(matches!(
            tracker.start("Celeste"),
            Err(TrackError::AlreadyTracking { .. })
        ));

        let finished = tracker.stop().unwrap();
        assert_eq!(finished.game, "Hades");
        assert_eq!(finished.session.elapsed_secs, 20);
        assert!(tracker.start("Celeste").is_ok());
    }

    #[test]
    fn stop_without_session_is_not_tracking() {
        let mut tracker = Tracker::with_clock(ManualClock::new());
        assert_eq!(tracker.stop(), Err(TrackError::NotTracking));
        assert_eq!(tracker.toggle_pause(), Err(TrackError::NotTracking));
        assert!(tracker.shutdown().is_none());
    }

    #[test]
    fn toggle_pause_alternates() {
        let clock = ManualClock::new();
        let mut tracker = Tracker::with_clock(clock.clone());
        tracker.start("Outer Wilds").unwrap();
        clock.advance(30);
        assert_eq!(tracker.toggle_pause(), Ok(TimerStatus::Paused));
        clock.advance(60);
        assert_eq!(tracker.elapsed(), Some(Duration::from_secs(30)));
        assert_eq!(tracker.toggle_pause(), Ok(TimerStatus::Running));
        clock.advance(60);
        assert_eq!(tracker.elapsed(), Some(Duration::from_secs(90)));
        assert_eq!(
            tracker.resume(),
            Err(TrackError::Timer(TimerError::InvalidTransition {
                from: TimerStatus::Running,
                action: "resume"
            }))
        );
    }

    #[test]
    fn shutdown_finalizes_active_session() {
        let clock = ManualClock::new();
        let mut tracker = Tracker::with_clock(clock.clone());
        tracker.start("Tetris").unwrap();
        clock.advance(45);
        let finished = tracker.shutdown().expect("active session");
        assert_eq!(finished.session.elapsed_secs, 45);
        assert_eq!(tracker.status(), TimerStatus::Idle);
    }
}
