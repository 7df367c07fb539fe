//! Bluetooth Module
//!
//! Drives the infrared blaster over BLE GATT.
//!
//! ## Architecture
//!
//! ```text
//!   callers ──Request + reply──► ┌─────────────┐        ┌───────────────┐
//!                                │ DeviceActor │ ─────► │ DeviceSession │ ──► protocol
//!                                └──────▲──────┘        └───────────────┘
//!                                       │ SessionUpdate
//!                              ┌────────┴──────────────┐
//!                              │ ConnectionSupervisor  │ ──► BleTransport (scan/connect)
//!                              └───────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Transport capability traits
//! - [`protocol`] - UUIDs, chunked upload and status decoding
//! - [`session`] - Characteristic table and per-connection operations
//! - [`supervisor`] - Connection state machine and reconnection
//! - [`actor`] - Request serialization
//! - `winrt` - Windows backend (Windows only)

pub mod actor;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod transport;

#[cfg(windows)]
pub mod winrt;

#[cfg(test)]
pub(crate) mod mock;

pub use actor::{ActorHandle, DeviceActor, Request};
pub use session::{CharacteristicTable, DeviceSession};
pub use supervisor::{ConnectionSupervisor, SessionUpdate};
pub use transport::{BleLink, BleTransport, DiscoveredService, GattEndpoint, ScanResult};

#[cfg(windows)]
pub use winrt::WinRtTransport;
