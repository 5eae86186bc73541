use thiserror::Error;

use crate::adapter::RadioState;

/// Failures absorbed by the link and surfaced as status text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("failed to connect: {0}")]
    ConnectFailed(String),
    #[error("service discovery failed: {0}")]
    ServiceDiscovery(String),
    #[error("characteristic discovery failed: {0}")]
    CharacteristicDiscovery(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("disconnected: {0}")]
    Disconnected(String),
    #[error("connection stalled")]
    Stalled,
    #[error("{}", radio_hint(.0))]
    Radio(RadioState),
}

fn radio_hint(state: &RadioState) -> &'static str {
    match state {
        RadioState::Unauthorized => "Enable Bluetooth permissions in Settings",
        RadioState::Unsupported => "This device cannot connect to the remote",
        RadioState::PoweredOff => "Bluetooth is off",
        RadioState::PoweredOn | RadioState::Other => "Bluetooth unavailable",
    }
}
