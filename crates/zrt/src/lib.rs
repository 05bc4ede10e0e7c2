//! Wire model for the Zigbee runtime websocket protocol.
//!
//! The runtime owns the radio, the device database and all cluster
//! logic. This crate only describes what crosses the socket: device and
//! group snapshots, platform entity descriptors, state-changed events,
//! and the command request/acknowledgement framing.

pub mod command;
pub mod config;
pub mod event;
pub mod model;
pub mod platform;
pub mod state;

pub use command::{ClientRequest, CommandRequest, CommandResponse, EntityRef};
pub use event::{RuntimeEvent, ServerMessage, StateChangedEvent};
pub use model::{DeviceModel, EntityDescriptor, Eui64, GroupModel};
pub use platform::Platform;
