use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};
use tracing::{debug, warn};

use super::{PresenceReporter, PresenceState};
use crate::{error::PresenceError, timefmt::format_short};

/// Discord Rich Presence over local IPC.
///
/// The IPC client lives on a worker thread; `report` only queues the state.
/// Connection attempts happen lazily; while an unshown state is waiting they
/// are retried periodically.
pub struct DiscordPresence {
    sender: Sender<PresenceState>,
}

impl DiscordPresence {
    /// Start the worker thread for the Discord application `client_id`.
    /// The connection is opened on the first report.
    pub fn spawn(client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let (sender, receiver) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("discord-presence".into())
            .spawn(move || run_worker(&client_id, receiver));
        if let Err(err) = spawned {
            warn!(%err, "Failed to start Discord presence worker");
        }
        Self { sender }
    }
}

impl PresenceReporter for DiscordPresence {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn report(&mut self, state: &PresenceState) {
        if self.sender.send(state.clone()).is_err() {
            debug!("Discord presence worker is gone; dropping update");
        }
    }
}

/// How often a disconnected worker retries while a state is waiting.
const RETRY_INTERVAL: Duration = Duration::from_secs(15);

fn run_worker(client_id: &str, receiver: Receiver<PresenceState>) {
    let mut worker = Worker::new(|| connect(client_id));
    loop {
        match receiver.recv_timeout(RETRY_INTERVAL) {
            Ok(state) => worker.submit(state),
            Err(RecvTimeoutError::Timeout) => worker.flush(),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    worker.finish();
}

/// An open connection that can display a state.
trait Link {
    fn push(&mut self, state: &PresenceState) -> Result<(), PresenceError>;
    fn disconnect(&mut self);
}

impl Link for DiscordIpcClient {
    fn push(&mut self, state: &PresenceState) -> Result<(), PresenceError> {
        apply(self, state)
    }

    fn disconnect(&mut self) {
        let _ = DiscordIpc::close(self);
    }
}

/// Holds the newest state until a connection has shown it.
///
/// `Presence` only forwards changes, so a state dropped while Discord was
/// unreachable would never be sent again.
struct Worker<L, C> {
    connect: C,
    link: Option<L>,
    pending: Option<(PresenceState, Instant)>,
}

impl<L, C> Worker<L, C>
where
    L: Link,
    C: FnMut() -> Result<L, PresenceError>,
{
    fn new(connect: C) -> Self {
        Self {
            connect,
            link: None,
            pending: None,
        }
    }

    fn submit(&mut self, state: PresenceState) {
        self.pending = Some((state, Instant::now()));
        self.flush();
    }

    fn flush(&mut self) {
        let Some((state, received)) = self.pending.as_ref() else {
            return;
        };
        let current = aged(state, received.elapsed());

        if self.link.is_none() {
            if matches!(current, PresenceState::Cleared) {
                self.pending = None;
                return;
            }
            match (self.connect)() {
                Ok(connected) => self.link = Some(connected),
                Err(err) => {
                    debug!(%err, "Discord unavailable");
                    return;
                }
            }
        }

        if let Some(link) = self.link.as_mut() {
            match link.push(&current) {
                Ok(()) => self.pending = None,
                Err(err) => {
                    warn!(%err, "Discord presence update failed; reconnecting later");
                    link.disconnect();
                    self.link = None;
                }
            }
        }
    }

    fn finish(mut self) {
        if let Some(mut link) = self.link.take() {
            let _ = link.push(&PresenceState::Cleared);
            link.disconnect();
        }
    }
}

/// A running timer's elapsed time moves on while the state waits.
fn aged(state: &PresenceState, waited: Duration) -> PresenceState {
    match state {
        PresenceState::Playing {
            game,
            elapsed,
            paused: false,
        } => PresenceState::Playing {
            game: game.clone(),
            elapsed: *elapsed + waited,
            paused: false,
        },
        other => other.clone(),
    }
}

fn connect(client_id: &str) -> Result<DiscordIpcClient, PresenceError> {
    let mut client = DiscordIpcClient::new(client_id)
        .map_err(|err| PresenceError::IntegrationUnavailable(err.to_string()))?;
    client
        .connect()
        .map_err(|err| PresenceError::IntegrationUnavailable(err.to_string()))?;
    debug!("Connected to Discord");
    Ok(client)
}

fn apply(client: &mut DiscordIpcClient, state: &PresenceState) -> Result<(), PresenceError> {
    let result = match state {
        PresenceState::Cleared => client.clear_activity(),
        PresenceState::Browsing { screen } => {
            let details = format!("Browsing {screen}");
            client.set_activity(activity::Activity::new().details(&details))
        }
        PresenceState::Playing {
            game,
            elapsed,
            paused,
        } => {
            let details = format!("Playing {game}");
            if *paused {
                let status = format!("Paused at {}", format_short(*elapsed));
                client.set_activity(activity::Activity::new().details(&details).state(&status))
            } else {
                let started = Utc::now().timestamp() - elapsed.as_secs() as i64;
                client.set_activity(
                    activity::Activity::new()
                        .details(&details)
                        .timestamps(activity::Timestamps::new().start(started)),
                )
            }
        }
    };
    result.map_err(|err| PresenceError::IntegrationUnavailable(err.to_string()))
}
