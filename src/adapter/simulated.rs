//! In-process remote for the demo binary and integration tests.
//!
//! [`SimulatedAdapter`] answers requests the way a JuiceBox Remote behind a
//! working radio would, reporting completions on the event channel.
//! [`RemoteHandle`] plays the remote's side: it toggles the radio, drops the
//! link, asks for the current song and records every song received.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{
    AdapterEvent, Advertisement, BleAdapter, Characteristic, EventSender, Peripheral,
    PeripheralId, PeripheralState, RadioState, WriteMode,
};
use crate::codec;
use crate::config::{
    DEVICE_NAME, NOTIFY_CHARACTERISTIC_UUID, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID,
};
use crate::song::Song;

/// How the simulated remote presents itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProfile {
    pub id: String,
    pub name: Option<String>,
    pub advertise_service: bool,
    pub max_write_length: Option<usize>,
    /// When false, service discovery requests are never answered.
    pub respond_to_discovery: bool,
    /// Ask for the current song as soon as notifications are enabled.
    pub request_on_subscribe: bool,
}

impl Default for RemoteProfile {
    fn default() -> Self {
        Self {
            id: "sim-remote-0001".to_owned(),
            name: Some(DEVICE_NAME.to_owned()),
            advertise_service: true,
            max_write_length: Some(20),
            respond_to_discovery: true,
            request_on_subscribe: false,
        }
    }
}

#[derive(Debug)]
struct RemoteState {
    radio: RadioState,
    connection: PeripheralState,
    subscribed: bool,
    scanning: bool,
    connections: usize,
    line: Vec<u8>,
    writes: Vec<Vec<u8>>,
    received: Vec<Song>,
}

type Shared = Arc<Mutex<RemoteState>>;

fn lock(state: &Shared) -> MutexGuard<'_, RemoteState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SimulatedAdapter {
    profile: RemoteProfile,
    events: EventSender,
    state: Shared,
}

impl SimulatedAdapter {
    /// Create the adapter and the handle controlling its remote. The radio
    /// starts powered off; call [`RemoteHandle::power`] to bring it up.
    pub fn new(profile: RemoteProfile, events: EventSender) -> (Self, RemoteHandle) {
        let state = Arc::new(Mutex::new(RemoteState {
            radio: RadioState::PoweredOff,
            connection: PeripheralState::Disconnected,
            subscribed: false,
            scanning: false,
            connections: 0,
            line: Vec::new(),
            writes: Vec::new(),
            received: Vec::new(),
        }));
        let handle = RemoteHandle {
            id: PeripheralId::new(profile.id.clone()),
            events: events.clone(),
            state: state.clone(),
        };
        (
            Self {
                profile,
                events,
                state,
            },
            handle,
        )
    }

    fn id(&self) -> PeripheralId {
        PeripheralId::new(self.profile.id.clone())
    }

    fn peripheral(&self) -> Peripheral {
        Peripheral::new(self.profile.id.clone(), self.profile.name.as_deref())
    }

    fn emit(&self, event: AdapterEvent) {
        if self.events.send(event).is_err() {
            trace!("simulated adapter has no listener");
        }
    }

    fn ensure_powered(&self) -> anyhow::Result<()> {
        let radio = lock(&self.state).radio;
        if radio != RadioState::PoweredOn {
            anyhow::bail!("bluetooth {radio}");
        }
        Ok(())
    }

    fn ensure_connected(&self, id: &PeripheralId) -> anyhow::Result<()> {
        self.ensure_powered()?;
        if *id != self.id() || lock(&self.state).connection != PeripheralState::Connected {
            anyhow::bail!("{id} is not connected");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BleAdapter for SimulatedAdapter {
    async fn scan(&mut self, services: Option<&[Uuid]>) -> anyhow::Result<()> {
        self.ensure_powered()?;
        lock(&self.state).scanning = true;
        let visible = match services {
            Some(services) => self.profile.advertise_service && services.contains(&SERVICE_UUID),
            None => true,
        };
        if visible {
            let advertisement = Advertisement {
                local_name: self.profile.name.clone(),
                service_uuids: if self.profile.advertise_service {
                    vec![SERVICE_UUID]
                } else {
                    Vec::new()
                },
                overflow_service_uuids: Vec::new(),
            };
            self.emit(AdapterEvent::Discovered {
                peripheral: self.peripheral(),
                advertisement,
            });
        }
        Ok(())
    }

    async fn stop_scan(&mut self) -> anyhow::Result<()> {
        lock(&self.state).scanning = false;
        Ok(())
    }

    async fn retrieve_connected(&mut self, _services: &[Uuid]) -> anyhow::Result<Vec<Peripheral>> {
        self.ensure_powered()?;
        if lock(&self.state).connection == PeripheralState::Connected {
            Ok(vec![self.peripheral()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn connect(&mut self, id: &PeripheralId) -> anyhow::Result<()> {
        self.ensure_powered()?;
        if *id != self.id() {
            self.emit(AdapterEvent::ConnectFailed {
                id: id.clone(),
                error: "unknown peripheral".to_owned(),
            });
            return Ok(());
        }
        {
            let mut state = lock(&self.state);
            state.connection = PeripheralState::Connected;
            state.connections += 1;
        }
        self.emit(AdapterEvent::Connected(id.clone()));
        Ok(())
    }

    async fn cancel_connection(&mut self, id: &PeripheralId) -> anyhow::Result<()> {
        if *id != self.id() {
            return Ok(());
        }
        let was_connected = {
            let mut state = lock(&self.state);
            state.subscribed = false;
            state.line.clear();
            std::mem::replace(&mut state.connection, PeripheralState::Disconnected)
                != PeripheralState::Disconnected
        };
        if was_connected {
            self.emit(AdapterEvent::Disconnected {
                id: id.clone(),
                error: None,
            });
        }
        Ok(())
    }

    async fn discover_services(
        &mut self,
        id: &PeripheralId,
        _services: Option<&[Uuid]>,
    ) -> anyhow::Result<()> {
        self.ensure_connected(id)?;
        if self.profile.respond_to_discovery {
            self.emit(AdapterEvent::ServicesDiscovered {
                id: id.clone(),
                services: vec![SERVICE_UUID],
                error: None,
            });
        } else {
            debug!("simulated remote ignoring service discovery");
        }
        Ok(())
    }

    async fn discover_characteristics(
        &mut self,
        id: &PeripheralId,
        service: Uuid,
        _characteristics: Option<&[Uuid]>,
    ) -> anyhow::Result<()> {
        self.ensure_connected(id)?;
        let characteristics = if service == SERVICE_UUID {
            vec![WRITE_CHARACTERISTIC_UUID, NOTIFY_CHARACTERISTIC_UUID]
        } else {
            Vec::new()
        };
        self.emit(AdapterEvent::CharacteristicsDiscovered {
            id: id.clone(),
            service,
            characteristics,
            error: None,
        });
        Ok(())
    }

    async fn set_notify(
        &mut self,
        id: &PeripheralId,
        characteristic: Characteristic,
        enabled: bool,
    ) -> anyhow::Result<()> {
        self.ensure_connected(id)?;
        if characteristic.uuid != NOTIFY_CHARACTERISTIC_UUID {
            anyhow::bail!("{} does not notify", characteristic.uuid);
        }
        lock(&self.state).subscribed = enabled;
        if enabled && self.profile.request_on_subscribe {
            self.emit(AdapterEvent::ValueUpdated {
                id: id.clone(),
                characteristic: NOTIFY_CHARACTERISTIC_UUID,
                value: codec::REQUEST_SONG.as_bytes().to_vec(),
                error: None,
            });
        }
        Ok(())
    }

    async fn write(
        &mut self,
        id: &PeripheralId,
        characteristic: Characteristic,
        data: &[u8],
        _mode: WriteMode,
    ) -> anyhow::Result<()> {
        self.ensure_connected(id)?;
        if characteristic.uuid != WRITE_CHARACTERISTIC_UUID {
            anyhow::bail!("{} is not writable", characteristic.uuid);
        }
        if let Some(max) = self.profile.max_write_length {
            if data.len() > max {
                anyhow::bail!("write of {} bytes exceeds {max}", data.len());
            }
        }

        let completed: Vec<Song> = {
            let mut state = lock(&self.state);
            state.writes.push(data.to_vec());
            state.line.extend_from_slice(data);
            let mut songs = Vec::new();
            while let Some(end) = state.line.iter().position(|b| *b == codec::TERMINATOR) {
                let line: Vec<u8> = state.line.drain(..=end).collect();
                match codec::parse_song(&line) {
                    Some(song) => songs.push(song),
                    None => debug!("simulated remote dropped {:?}", String::from_utf8_lossy(&line)),
                }
            }
            state.received.extend(songs.iter().cloned());
            songs
        };

        for song in completed {
            info!("simulated remote now showing {song}");
            self.emit(AdapterEvent::ValueUpdated {
                id: id.clone(),
                characteristic: NOTIFY_CHARACTERISTIC_UUID,
                value: codec::ACK.as_bytes().to_vec(),
                error: None,
            });
        }
        Ok(())
    }

    fn max_write_length(&self, _id: &PeripheralId, _mode: WriteMode) -> Option<usize> {
        self.profile.max_write_length
    }

    fn peripheral_state(&self, id: &PeripheralId) -> PeripheralState {
        if *id == self.id() {
            lock(&self.state).connection
        } else {
            PeripheralState::Disconnected
        }
    }
}

/// The remote's side of a [`SimulatedAdapter`].
#[derive(Clone)]
pub struct RemoteHandle {
    id: PeripheralId,
    events: EventSender,
    state: Shared,
}

impl RemoteHandle {
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    /// Change the radio state. Losing power drops the link silently, as the
    /// platform does.
    pub fn power(&self, radio: RadioState) {
        {
            let mut state = lock(&self.state);
            state.radio = radio;
            if radio != RadioState::PoweredOn {
                state.connection = PeripheralState::Disconnected;
                state.subscribed = false;
                state.scanning = false;
                state.line.clear();
            }
        }
        let _ = self.events.send(AdapterEvent::StateChanged(radio));
    }

    /// Send `REQ|SONG`. Returns false when notifications are not enabled.
    pub fn request_song(&self) -> bool {
        if !lock(&self.state).subscribed {
            return false;
        }
        self.events
            .send(AdapterEvent::ValueUpdated {
                id: self.id.clone(),
                characteristic: NOTIFY_CHARACTERISTIC_UUID,
                value: codec::REQUEST_SONG.as_bytes().to_vec(),
                error: None,
            })
            .is_ok()
    }

    /// Drop the link from the remote's side. Returns false when not connected.
    pub fn drop_link(&self) -> bool {
        {
            let mut state = lock(&self.state);
            if state.connection != PeripheralState::Connected {
                return false;
            }
            state.connection = PeripheralState::Disconnected;
            state.subscribed = false;
            state.line.clear();
        }
        self.events
            .send(AdapterEvent::Disconnected {
                id: self.id.clone(),
                error: Some("connection lost".to_owned()),
            })
            .is_ok()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connection == PeripheralState::Connected
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.state).scanning
    }

    /// Successful connections so far.
    pub fn connections(&self) -> usize {
        lock(&self.state).connections
    }

    /// Songs the remote has fully received, oldest first.
    pub fn received(&self) -> Vec<Song> {
        lock(&self.state).received.clone()
    }

    /// Raw writes in arrival order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.state).writes.clone()
    }
}
