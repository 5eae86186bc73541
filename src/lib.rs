//! Session manager for the JuiceBox Remote: finds the remote over BLE, keeps
//! the link alive and pushes now-playing songs to it.

#[macro_use]
extern crate log;

pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod identify;
pub mod link;
mod logging;
pub mod memory;
pub mod metadata;
pub mod pipeline;
pub mod session;
pub mod song;
pub mod timer;
pub mod watchdog;

pub use adapter::{AdapterEvent, BleAdapter, PeripheralId, RadioState};
pub use config::Config;
pub use error::LinkError;
pub use link::{Command, Input, Link, LinkState, Status};
pub use logging::{init_logging, level_from_env};
pub use memory::{DeviceMemory, FileMemory, InMemory};
pub use session::{spawn, SessionHandle};
pub use song::Song;
