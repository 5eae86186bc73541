//! Boundary to the platform BLE stack.
//!
//! Requests go out through [`BleAdapter`]; their completions come back as
//! [`AdapterEvent`]s on the channel created by [`channel`], and are handled
//! on the session's serial context.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod simulated;

/// Stable identity token of a physical peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeripheralId(pub String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a peripheral as reported by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peripheral {
    pub id: PeripheralId,
    /// Name cached by the platform, if any.
    pub name: Option<String>,
}

impl Peripheral {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: PeripheralId::new(id),
            name: name.map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: Option<String>,
    pub service_uuids: Vec<Uuid>,
    pub overflow_service_uuids: Vec<Uuid>,
}

impl Advertisement {
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.service_uuids.contains(service) || self.overflow_service_uuids.contains(service)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioState {
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unsupported,
    Other,
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RadioState::PoweredOn => "powered on",
            RadioState::PoweredOff => "powered off",
            RadioState::Unauthorized => "unauthorized",
            RadioState::Unsupported => "unsupported",
            RadioState::Other => "unavailable",
        };
        f.write_str(text)
    }
}

/// Connection state of a peripheral as seen by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// A characteristic located by its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Characteristic {
    pub service: Uuid,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredPeripheral {
    pub peripheral: Peripheral,
    pub state: PeripheralState,
}

/// Callbacks from the BLE stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    StateChanged(RadioState),
    Discovered {
        peripheral: Peripheral,
        advertisement: Advertisement,
    },
    Connected(PeripheralId),
    ConnectFailed {
        id: PeripheralId,
        error: String,
    },
    Disconnected {
        id: PeripheralId,
        error: Option<String>,
    },
    ServicesDiscovered {
        id: PeripheralId,
        services: Vec<Uuid>,
        error: Option<String>,
    },
    CharacteristicsDiscovered {
        id: PeripheralId,
        service: Uuid,
        characteristics: Vec<Uuid>,
        error: Option<String>,
    },
    ValueUpdated {
        id: PeripheralId,
        characteristic: Uuid,
        value: Vec<u8>,
        error: Option<String>,
    },
    RestoreState {
        peripherals: Vec<RestoredPeripheral>,
        scan_services: Vec<Uuid>,
    },
}

pub type EventSender = mpsc::UnboundedSender<AdapterEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;

/// Create the channel an adapter reports its callbacks on.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Requests to the BLE stack.
///
/// Every method only issues the request; its outcome arrives later as an
/// [`AdapterEvent`]. An `Err` means the request could not be issued at all.
#[async_trait::async_trait]
pub trait BleAdapter: Send {
    async fn scan(&mut self, services: Option<&[Uuid]>) -> anyhow::Result<()>;
    async fn stop_scan(&mut self) -> anyhow::Result<()>;
    /// Peripherals already connected at the OS level exposing `services`.
    async fn retrieve_connected(&mut self, services: &[Uuid]) -> anyhow::Result<Vec<Peripheral>>;
    async fn connect(&mut self, id: &PeripheralId) -> anyhow::Result<()>;
    async fn cancel_connection(&mut self, id: &PeripheralId) -> anyhow::Result<()>;
    async fn discover_services(
        &mut self,
        id: &PeripheralId,
        services: Option<&[Uuid]>,
    ) -> anyhow::Result<()>;
    async fn discover_characteristics(
        &mut self,
        id: &PeripheralId,
        service: Uuid,
        characteristics: Option<&[Uuid]>,
    ) -> anyhow::Result<()>;
    async fn set_notify(
        &mut self,
        id: &PeripheralId,
        characteristic: Characteristic,
        enabled: bool,
    ) -> anyhow::Result<()>;
    async fn write(
        &mut self,
        id: &PeripheralId,
        characteristic: Characteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> anyhow::Result<()>;
    /// Largest single write the link accepts, if negotiated.
    fn max_write_length(&self, id: &PeripheralId, mode: WriteMode) -> Option<usize>;
    fn peripheral_state(&self, id: &PeripheralId) -> PeripheralState;
}
