//! Public face of the link: a tokio actor that serializes commands, adapter
//! callbacks and timers onto one task, and a cloneable handle to drive it.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::adapter::{BleAdapter, EventReceiver};
use crate::config::Config;
use crate::link::{Command, Input, Link, Status};
use crate::memory::DeviceMemory;
use crate::song::Song;

/// Spawn the session actor on the current tokio runtime.
///
/// `events` must be the receiving end of the channel `adapter` reports on.
pub fn spawn<A, M>(
    adapter: A,
    events: EventReceiver,
    memory: M,
    config: Config,
) -> (SessionHandle, JoinHandle<()>)
where
    A: BleAdapter + 'static,
    M: DeviceMemory + 'static,
{
    let link = Link::new(adapter, memory, config);
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(link.status());
    let task = tokio::spawn(run(link, events, command_rx, status_tx));
    let handle = SessionHandle {
        commands: command_tx,
        status: status_rx,
    };
    (handle, task)
}

async fn run<A, M>(
    mut link: Link<A, M>,
    mut events: EventReceiver,
    mut commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<Status>,
) where
    A: BleAdapter,
    M: DeviceMemory,
{
    info!("session started");
    let mut events_open = true;
    loop {
        let deadline = link.next_deadline();
        let idle = Instant::now() + Duration::from_secs(3600);
        tokio::select! {
            biased;

            event = events.recv(), if events_open => match event {
                Some(event) => link.handle(Input::Adapter(event)).await,
                None => {
                    warn!("adapter event channel closed");
                    events_open = false;
                }
            },
            command = commands.recv() => match command {
                Some(command) => link.handle(Input::Command(command)).await,
                // Every handle is gone.
                None => link.handle(Input::Command(Command::Shutdown)).await,
            },
            () = tokio::time::sleep_until(deadline.unwrap_or(idle)), if deadline.is_some() => {
                link.fire_due_timers().await;
            }
        }

        status.send_if_modified(|current| {
            let next = link.status();
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if link.is_shut_down() {
            break;
        }
    }
    info!("session stopped");
}

/// Cloneable handle to a running session. Commands never fail: once the
/// session has stopped they are dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Status>,
}

impl SessionHandle {
    pub fn start_scanning(&self) {
        self.command(Command::StartScanning);
    }

    /// Disconnect when connected, otherwise reconnect or scan.
    pub fn toggle_connection(&self) {
        self.command(Command::ToggleConnection);
    }

    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    pub fn send(&self, song: Song, force: bool) {
        self.command(Command::Send { song, force });
    }

    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected
    }

    pub fn is_busy(&self) -> bool {
        self.status.borrow().is_busy
    }

    pub fn can_send(&self) -> bool {
        self.status.borrow().can_send
    }

    pub fn connection_description(&self) -> String {
        self.status.borrow().description.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// Wait until the status satisfies `predicate`. Returns `None` if the
    /// session stops first.
    pub async fn wait_for(&self, predicate: impl FnMut(&Status) -> bool) -> Option<Status> {
        let mut status = self.status.clone();
        let result = status.wait_for(predicate).await;
        result.ok().map(|status| status.clone())
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("session stopped, dropping command");
        }
    }
}
