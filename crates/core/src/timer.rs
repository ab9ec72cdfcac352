//! Play-session timer state machine.
//!
//! Elapsed time is always derived from monotonic [`Instant`] samples: closed
//! running intervals are summed once when they close, and the open interval
//! is measured against the sample passed in. Nothing is accumulated per tick.

use std::{
    fmt,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};

use crate::{
    error::TimerError,
    models::{Pause, Session},
};

/// A point in time as seen by both the monotonic and the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    /// Monotonic reading used for elapsed-time arithmetic.
    pub instant: Instant,
    /// Wall-clock reading stored in the session record.
    pub wall: DateTime<Utc>,
}

/// Source of time samples.
pub trait Clock {
    /// Take a sample of the current time.
    fn sample(&self) -> Sample;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sample(&self) -> Sample {
        Sample {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Observable state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    /// Not started.
    Idle,
    /// Accumulating time.
    Running,
    /// Started but not accumulating.
    Paused,
    /// Finalized; no further transitions.
    Stopped,
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Running { since: Instant },
    Paused { since: Instant },
    Stopped,
}

/// Tracks one session from start to stop.
#[derive(Debug, Clone)]
pub struct SessionTimer {
    state: State,
    started_at: Option<DateTime<Utc>>,
    accumulated: Duration,
    pauses: Vec<Pause>,
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTimer {
    /// A timer in the `Idle` state.
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            started_at: None,
            accumulated: Duration::ZERO,
            pauses: Vec::new(),
        }
    }

    /// Current state.
    pub fn status(&self) -> TimerStatus {
        match self.state {
            State::Idle => TimerStatus::Idle,
            State::Running { .. } => TimerStatus::Running,
            State::Paused { .. } => TimerStatus::Paused,
            State::Stopped => TimerStatus::Stopped,
        }
    }

    /// Wall-clock start, once started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Pause ledger so far.
    pub fn pauses(&self) -> &[Pause] {
        &self.pauses
    }

    /// Running time up to `now`, excluding pauses.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.state {
            State::Running { since } => {
                self.accumulated + now.saturating_duration_since(since)
            }
            _ => self.accumulated,
        }
    }

    /// Idle → Running.
    pub fn start(&mut self, at: Sample) -> Result<(), TimerError> {
        match self.state {
            State::Idle => {
                self.state = State::Running { since: at.instant };
                self.started_at = Some(at.wall);
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    /// Running → Paused.
    pub fn pause(&mut self, at: Sample) -> Result<(), TimerError> {
        match self.state {
            State::Running { since } => {
                self.accumulated += at.instant.saturating_duration_since(since);
                self.pauses.push(Pause {
                    paused_at: at.wall,
                    resumed_at: None,
                    duration_secs: 0,
                });
                self.state = State::Paused { since: at.instant };
                Ok(())
            }
            _ => Err(self.invalid("pause")),
        }
    }

    /// Paused → Running.
    pub fn resume(&mut self, at: Sample) -> Result<(), TimerError> {
        match self.state {
            State::Paused { since } => {
                self.close_pause(since, at, true);
                self.state = State::Running { since: at.instant };
                Ok(())
            }
            _ => Err(self.invalid("resume")),
        }
    }

    /// Running/Paused → Stopped, returning the finalized session.
    ///
    /// Calling this again returns [`TimerError::AlreadyStopped`] and leaves the
    /// recorded time untouched.
    pub fn stop(&mut self, at: Sample) -> Result<Session, TimerError> {
        match self.state {
            State::Running { since } => {
                self.accumulated += at.instant.saturating_duration_since(since);
            }
            State::Paused { since } => self.close_pause(since, at, false),
            State::Stopped => return Err(TimerError::AlreadyStopped),
            State::Idle => return Err(self.invalid("stop")),
        }
        self.state = State::Stopped;

        let start = self.started_at.unwrap_or(at.wall);
        Ok(Session {
            start,
            end: Some(at.wall.max(start)),
            elapsed_secs: self.accumulated.as_secs(),
            pauses: self.pauses.clone(),
            manual: false,
            feedback: None,
        })
    }

    fn close_pause(&mut self, since: Instant, at: Sample, resumed: bool) {
        let paused_for = at.instant.saturating_duration_since(since);
        if let Some(pause) = self.pauses.last_mut() {
            pause.duration_secs = paused_for.as_secs();
            if resumed {
                pause.resumed_at = Some(at.wall);
            }
        }
    }

    fn invalid(&self, action: &'static str) -> TimerError {
        TimerError::InvalidTransition {
            from: self.status(),
            action,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    /// Manually advanced clock shared between a test and the code under test.
    #[derive(Clone)]
    pub(crate) struct ManualClock {
        base_instant: Instant,
        base_wall: DateTime<Utc>,
        offset: Rc<Cell<Duration>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self {
                base_instant: Instant::now(),
                base_wall: DateTime::parse_from_rfc3339("2024-03-01T18:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
                offset: Rc::new(Cell::new(Duration::ZERO)),
            }
        }

        pub(crate) fn advance(&self, secs: u64) {
            self.offset.set(self.offset.get() + Duration::from_secs(secs));
        }
    }

    impl Clock for ManualClock {
        fn sample(&self) -> Sample {
            let offset = self.offset.get();
            Sample {
                instant: self.base_instant + offset,
                wall: self.base_wall + chrono::Duration::from_std(offset).unwrap(),
            }
        }
    }

    #[test]
    fn pause_interval_is_excluded() {
        let clock = ManualClock::new();
        let mut timer = SessionTimer::new();
        timer.start(clock.sample()).unwrap();
        clock.advance(30);
        timer.pause(clock.sample()).unwrap();
        clock.advance(60);
        timer.resume(clock.sample()).unwrap();
        clock.advance(60);
        let session = timer.stop(clock.sample()).unwrap();

        assert_eq!(session.elapsed_secs, 90);
        assert_eq!(session.pauses.len(), 1);
        assert_eq!(session.pauses[0].duration_secs, 60);
        assert!(session.pauses[0].resumed_at.is_some());
        let span = session.end.unwrap() - session.start;
        assert_eq!(span.num_seconds(), 150);
    }

    #[test]
    fn elapsed_equals_sum_of_running_intervals() {
        // (run, pause) pairs; the final run has no pause after it.
        let plan = [(5, 7), (11, 0), (0, 13), (17, 19), (23, 29)];
        let clock = ManualClock::new();
        let mut timer = SessionTimer::new();
        timer.start(clock.sample()).unwrap();
        let mut expected = 0;
        for (run, pause) in plan {
            clock.advance(run);
            expected += run;
            assert_eq!(timer.elapsed(clock.sample().instant).as_secs(), expected);
            timer.pause(clock.sample()).unwrap();
            clock.advance(pause);
            assert_eq!(timer.elapsed(clock.sample().instant).as_secs(), expected);
            timer.resume(clock.sample()).unwrap();
        }
        clock.advance(3);
        expected += 3;
        let session = timer.stop(clock.sample()).unwrap();
        assert_eq!(session.elapsed_secs, expected);
        assert_eq!(session.paused().as_secs(), 7 + 13 + 19 + 29);
    }

    #[test]
    fn stop_while_paused_closes_the_open_pause() {
        let clock = ManualClock::new();
        let mut timer = SessionTimer::new();
        timer.start(clock.sample()).unwrap();
        clock.advance(40);
        timer.pause(clock.sample()).unwrap();
        clock.advance(100);
        let session = timer.stop(clock.sample()).unwrap();
        assert_eq!(session.elapsed_secs, 40);
        assert_eq!(session.pauses[0].duration_secs, 100);
        assert!(session.pauses[0].resumed_at.is_none());
    }

    #[test]
    fn second_stop_is_rejected_without_recounting() {
        let clock = ManualClock::new();
        let mut timer = SessionTimer::new();
        timer.start(clock.sample()).unwrap();
        clock.advance(10);
        let first = timer.stop(clock.sample()).unwrap();
        clock.advance(50);
        assert_eq!(timer.stop(clock.sample()), Err(TimerError::AlreadyStopped));
        assert_eq!(timer.elapsed(clock.sample().instant).as_secs(), first.elapsed_secs);
        assert_eq!(timer.status(), TimerStatus::Stopped);
    }

    #[test]
    fn invalid_transitions_are_reported() {
        let clock = ManualClock::new();
        let mut timer = SessionTimer::new();
        assert_eq!(
            timer.pause(clock.sample()),
            Err(TimerError::InvalidTransition {
                from: TimerStatus::Idle,
                action: "pause"
            })
        );
        assert!(timer.stop(clock.sample()).is_err());
        timer.start(clock.sample()).unwrap();
        assert!(timer.start(clock.sample()).is_err());
        assert!(timer.resume(clock.sample()).is_err());
        timer.pause(clock.sample()).unwrap();
        assert!(timer.pause(clock.sample()).is_err());
    }
}
