//! Driver for BLE GATT infrared blasters.
//!
//! [`BleIrDriver`] owns one device: it encodes pulse trains, uploads them in
//! 20-byte chunks, triggers transmission and decodes the device status, and
//! keeps the link alive across disconnects. Platform access goes through the
//! [`BleTransport`] traits; a WinRT implementation ships for Windows.

pub mod domain;
pub mod driver;
pub mod infrastructure;
pub mod module;

pub use domain::error::{DeviceError, IrError};
pub use domain::models::{BleAddress, ConnectionState, DeviceInfo};
pub use domain::settings::{DriverConfig, Settings, SettingsService};
pub use driver::BleIrDriver;
pub use infrastructure::bluetooth::transport::{BleLink, BleTransport, GattEndpoint};
pub use module::{ErrorCode, IrData, IrDevice, ModuleError};
