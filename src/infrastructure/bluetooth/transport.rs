//! BLE Transport Capabilities
//!
//! The wireless stack is consumed only through these traits:
//! scan, connect, discover, read, and write-without-response, plus a
//! stream of connection status events per link.

use crate::domain::models::{BleAddress, LinkEvent};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// An advertisement that matched the scan filter
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub address: BleAddress,
    pub name: String,
    pub signal_strength: i16,
}

/// One GATT service and the characteristics discovered under it
pub struct DiscoveredService<E> {
    pub uuid: Uuid,
    pub characteristics: Vec<(Uuid, E)>,
}

/// Entry point to the platform Bluetooth stack
#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    type Link: BleLink;

    /// Scan until an advertisement from `address` is seen, then stop scanning.
    async fn scan(&self, address: BleAddress) -> Result<ScanResult>;

    /// Open a connection. `timeout` bounds a single attempt.
    async fn connect(&self, address: BleAddress, timeout: Option<Duration>) -> Result<Self::Link>;
}

/// A live connection to one peripheral
#[async_trait]
pub trait BleLink: Send + Sync + 'static {
    type Endpoint: GattEndpoint;

    /// Discover every service and characteristic on the peripheral.
    async fn discover(&self) -> Result<Vec<DiscoveredService<Self::Endpoint>>>;

    /// Subscribe to connection status changes for this link.
    fn events(&self) -> Result<mpsc::UnboundedReceiver<LinkEvent>>;

    fn is_connected(&self) -> bool;
}

/// A readable/writable characteristic handle
#[async_trait]
pub trait GattEndpoint: Send + Sync + 'static {
    /// Read the current value, appending it to `out`.
    async fn read_into(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Unacknowledged write.
    async fn write_without_response(&self, data: &[u8]) -> Result<()>;
}
