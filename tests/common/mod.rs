#![allow(dead_code)]

use juicebox::adapter::{
    AdapterEvent, Advertisement, BleAdapter, Characteristic, Peripheral, PeripheralId,
    PeripheralState, RadioState, WriteMode,
};
use juicebox::config::{NOTIFY_CHARACTERISTIC_UUID, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID};
use juicebox::link::{Input, Link, LinkState};
use juicebox::memory::DeviceMemory;
use juicebox::Config;
use uuid::Uuid;

pub const REMOTE_ID: &str = "remote-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Scan(Option<Vec<Uuid>>),
    StopScan,
    RetrieveConnected,
    Connect(PeripheralId),
    CancelConnection(PeripheralId),
    DiscoverServices(PeripheralId),
    DiscoverCharacteristics(PeripheralId, Uuid),
    SetNotify(PeripheralId, Uuid, bool),
    Write(PeripheralId, Vec<u8>),
}

/// Adapter that records every request and answers none of them.
#[derive(Debug)]
pub struct RecordingAdapter {
    pub calls: Vec<Call>,
    pub max_write_length: Option<usize>,
    pub state: PeripheralState,
    pub connected: Vec<Peripheral>,
    pub fail_writes: bool,
}

impl Default for RecordingAdapter {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            max_write_length: Some(512),
            state: PeripheralState::Disconnected,
            connected: Vec::new(),
            fail_writes: false,
        }
    }
}

impl RecordingAdapter {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Write(_, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    pub fn last_scan(&self) -> Option<Option<Vec<Uuid>>> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Scan(filter) => Some(filter.clone()),
            _ => None,
        })
    }
}

#[async_trait::async_trait]
impl BleAdapter for RecordingAdapter {
    async fn scan(&mut self, services: Option<&[Uuid]>) -> anyhow::Result<()> {
        self.calls.push(Call::Scan(services.map(<[Uuid]>::to_vec)));
        Ok(())
    }

    async fn stop_scan(&mut self) -> anyhow::Result<()> {
        self.calls.push(Call::StopScan);
        Ok(())
    }

    async fn retrieve_connected(&mut self, _services: &[Uuid]) -> anyhow::Result<Vec<Peripheral>> {
        self.calls.push(Call::RetrieveConnected);
        Ok(self.connected.clone())
    }

    async fn connect(&mut self, id: &PeripheralId) -> anyhow::Result<()> {
        self.calls.push(Call::Connect(id.clone()));
        Ok(())
    }

    async fn cancel_connection(&mut self, id: &PeripheralId) -> anyhow::Result<()> {
        self.calls.push(Call::CancelConnection(id.clone()));
        Ok(())
    }

    async fn discover_services(
        &mut self,
        id: &PeripheralId,
        _services: Option<&[Uuid]>,
    ) -> anyhow::Result<()> {
        self.calls.push(Call::DiscoverServices(id.clone()));
        Ok(())
    }

    async fn discover_characteristics(
        &mut self,
        id: &PeripheralId,
        service: Uuid,
        _characteristics: Option<&[Uuid]>,
    ) -> anyhow::Result<()> {
        self.calls.push(Call::DiscoverCharacteristics(id.clone(), service));
        Ok(())
    }

    async fn set_notify(
        &mut self,
        id: &PeripheralId,
        characteristic: Characteristic,
        enabled: bool,
    ) -> anyhow::Result<()> {
        self.calls
            .push(Call::SetNotify(id.clone(), characteristic.uuid, enabled));
        Ok(())
    }

    async fn write(
        &mut self,
        id: &PeripheralId,
        _characteristic: Characteristic,
        data: &[u8],
        _mode: WriteMode,
    ) -> anyhow::Result<()> {
        if self.fail_writes {
            anyhow::bail!("link layer error");
        }
        self.calls.push(Call::Write(id.clone(), data.to_vec()));
        Ok(())
    }

    fn max_write_length(&self, _id: &PeripheralId, _mode: WriteMode) -> Option<usize> {
        self.max_write_length
    }

    fn peripheral_state(&self, _id: &PeripheralId) -> PeripheralState {
        self.state
    }
}

/// Memory that counts how often it is written.
#[derive(Debug, Default)]
pub struct CountingMemory {
    pub identity: Option<PeripheralId>,
    pub sets: usize,
    pub clears: usize,
}

impl CountingMemory {
    pub fn remembering(id: &str) -> Self {
        Self {
            identity: Some(PeripheralId::new(id)),
            ..Self::default()
        }
    }
}

impl DeviceMemory for CountingMemory {
    fn known_identity(&self) -> Option<PeripheralId> {
        self.identity.clone()
    }

    fn set_known_identity(&mut self, id: &PeripheralId) -> anyhow::Result<()> {
        self.sets += 1;
        self.identity = Some(id.clone());
        Ok(())
    }

    fn clear_known_identity(&mut self) -> anyhow::Result<()> {
        self.clears += 1;
        self.identity = None;
        Ok(())
    }
}

pub type TestLink = Link<RecordingAdapter, CountingMemory>;

pub fn remote_id() -> PeripheralId {
    PeripheralId::new(REMOTE_ID)
}

pub fn remote() -> Peripheral {
    Peripheral::new(REMOTE_ID, Some("JuiceBox Remote"))
}

pub fn advert(name: Option<&str>, with_service: bool) -> Advertisement {
    Advertisement {
        local_name: name.map(str::to_owned),
        service_uuids: if with_service { vec![SERVICE_UUID] } else { Vec::new() },
        overflow_service_uuids: Vec::new(),
    }
}

pub fn discovered(peripheral: Peripheral, advertisement: Advertisement) -> Input {
    Input::Adapter(AdapterEvent::Discovered {
        peripheral,
        advertisement,
    })
}

pub fn radio(state: RadioState) -> Input {
    Input::Adapter(AdapterEvent::StateChanged(state))
}

pub fn connected(id: &PeripheralId) -> Input {
    Input::Adapter(AdapterEvent::Connected(id.clone()))
}

pub fn services(id: &PeripheralId) -> Input {
    Input::Adapter(AdapterEvent::ServicesDiscovered {
        id: id.clone(),
        services: vec![SERVICE_UUID],
        error: None,
    })
}

pub fn characteristics(id: &PeripheralId, found: &[Uuid]) -> Input {
    Input::Adapter(AdapterEvent::CharacteristicsDiscovered {
        id: id.clone(),
        service: SERVICE_UUID,
        characteristics: found.to_vec(),
        error: None,
    })
}

pub fn notification(id: &PeripheralId, text: &str) -> Input {
    Input::Adapter(AdapterEvent::ValueUpdated {
        id: id.clone(),
        characteristic: NOTIFY_CHARACTERISTIC_UUID,
        value: text.as_bytes().to_vec(),
        error: None,
    })
}

pub fn disconnected(id: &PeripheralId, error: Option<&str>) -> Input {
    Input::Adapter(AdapterEvent::Disconnected {
        id: id.clone(),
        error: error.map(str::to_owned),
    })
}

pub fn new_link(memory: CountingMemory) -> TestLink {
    Link::new(RecordingAdapter::default(), memory, Config::default())
}

/// Power on and walk the remote through discovery to a ready link.
pub async fn ready_link(memory: CountingMemory) -> TestLink {
    let mut link = new_link(memory);
    let id = remote_id();
    link.handle(radio(RadioState::PoweredOn)).await;
    link.handle(discovered(remote(), advert(Some("JuiceBox Remote"), true)))
        .await;
    link.handle(connected(&id)).await;
    link.handle(services(&id)).await;
    link.handle(characteristics(
        &id,
        &[WRITE_CHARACTERISTIC_UUID, NOTIFY_CHARACTERISTIC_UUID],
    ))
    .await;
    assert_eq!(link.state(), LinkState::Ready);
    link
}
