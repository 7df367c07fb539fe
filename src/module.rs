//! Plugin Host Adapter
//!
//! The surface a device-plugin host drives: a JSON device config in, a
//! coarse [`ErrorCode`] out, plus the info/send/drop lifecycle.

use crate::domain::error::{DeviceError, IrError};
use crate::domain::models::{BleAddress, DeviceInfo};
use crate::domain::settings::DriverConfig;
use crate::driver::BleIrDriver;
use crate::infrastructure::bluetooth::transport::BleTransport;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;

pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Device config as handed over by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub mac_address: String,
}

impl DeviceConfig {
    pub fn from_json(json: &str) -> Result<Self, IrError> {
        serde_json::from_str(json).map_err(|e| IrError::InvalidConfig(e.to_string()))
    }
}

/// One infrared transmission, pulse durations in nanoseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrData {
    pub pulse_nano_sec: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    Timeout,
    Unavailable,
    Unknown,
}

impl ErrorCode {
    pub fn of(error: &IrError) -> Self {
        if error.is_data_too_long() {
            return Self::InvalidInput;
        }
        match error {
            IrError::Device(DeviceError::InvalidData)
            | IrError::Device(DeviceError::UnsupportedData)
            | IrError::InvalidAddress(_)
            | IrError::InvalidConfig(_) => Self::InvalidInput,
            IrError::Device(DeviceError::RequestTimeout) | IrError::ReplyTimeout => Self::Timeout,
            IrError::NotConnected => Self::Unavailable,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid input",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
#[error("{code}: {source}")]
pub struct ModuleError {
    pub code: ErrorCode,
    #[source]
    pub source: IrError,
}

impl From<IrError> for ModuleError {
    fn from(source: IrError) -> Self {
        Self {
            code: ErrorCode::of(&source),
            source,
        }
    }
}

pub struct IrDevice {
    driver: BleIrDriver,
}

impl IrDevice {
    /// Parse `json` and connect to the configured blaster with default settings.
    pub async fn load<T: BleTransport>(json: &str, transport: T) -> Result<Self, ModuleError> {
        Self::load_with_config(json, transport, DriverConfig::default()).await
    }

    pub async fn load_with_config<T: BleTransport>(
        json: &str,
        transport: T,
        config: DriverConfig,
    ) -> Result<Self, ModuleError> {
        let device_config = DeviceConfig::from_json(json)?;
        let address: BleAddress = device_config.mac_address.parse()?;
        info!("Loading IR device {}", address);

        let driver =
            BleIrDriver::connect(transport, address, config, std::future::pending()).await?;
        Ok(Self { driver })
    }

    pub async fn info(&self) -> Result<DeviceInfo, ModuleError> {
        let firmware_version = self.driver.get_firmware_version().await?;
        Ok(DeviceInfo {
            firmware_version,
            driver_version: DRIVER_VERSION.to_string(),
        })
    }

    pub async fn send_ir(&self, data: &IrData) -> Result<(), ModuleError> {
        self.driver.send_infrared(&data.pulse_nano_sec).await?;
        Ok(())
    }

    pub async fn drop_device(self) {
        info!("Dropping IR device {}", self.driver.address());
        self.driver.shutdown().await;
    }
}
