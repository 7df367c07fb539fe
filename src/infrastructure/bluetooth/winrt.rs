//! Windows BLE Backend
//!
//! Implements the transport traits on top of the WinRT Bluetooth APIs:
//! advertisement watching for discovery, `BluetoothLEDevice` plus a
//! `GattSession` for the connection, and uncached GATT reads/writes.

use crate::domain::models::{BleAddress, LinkEvent};
use crate::infrastructure::bluetooth::transport::{
    BleLink, BleTransport, DiscoveredService, GattEndpoint, ScanResult,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCommunicationStatus, GattSession, GattWriteOption,
};
use windows::Devices::Bluetooth::{BluetoothCacheMode, BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter};

#[cfg(test)]
fn to_guid(uuid: &Uuid) -> GUID {
    let (data1, data2, data3, data4) = uuid.as_fields();
    GUID {
        data1,
        data2,
        data3,
        data4: *data4,
    }
}

/// Convert a Windows GUID into a UUID
fn from_guid(guid: &GUID) -> Uuid {
    Uuid::from_fields(guid.data1, guid.data2, guid.data3, &guid.data4)
}

/// Advertisement watcher filtered to one address
struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
}

impl BleScanner {
    fn new() -> Self {
        Self { watcher: None }
    }

    /// Start watching; every advertisement from `target` is sent on `found`.
    fn start(&mut self, target: BleAddress, found: mpsc::UnboundedSender<ScanResult>) -> Result<()> {
        self.stop()?;
        info!("Starting BLE scan for {}", target);

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let address = BleAddress::from_u64(args.BluetoothAddress()?);
                    if address == target {
                        let name = args.Advertisement()?.LocalName()?.to_string();
                        let _ = found.send(ScanResult {
                            address,
                            name: if name.is_empty() {
                                "Unknown".to_string()
                            } else {
                                name
                            },
                            signal_strength: args.RawSignalStrengthInDBm()?,
                        });
                    }
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE scan...");
            watcher.Stop()?;
        }
        Ok(())
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// The default WinRT Bluetooth adapter
#[derive(Default)]
pub struct WinRtTransport;

impl WinRtTransport {
    pub fn new() -> Self {
        Self
    }

    async fn open(&self, address: BleAddress) -> Result<WinRtLink> {
        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address.as_u64())?.await?;
        info!("Device opened: {:?}", device.Name()?);

        // Keeps Windows from dropping the link between our GATT calls
        let session = match Self::create_gatt_session(&device).await {
            Ok(session) => {
                debug!("GattSession created, MaintainConnection set to true");
                Some(session)
            }
            Err(e) => {
                warn!("Failed to create GattSession, continuing anyway: {}", e);
                None
            }
        };

        Ok(WinRtLink {
            device,
            _session: session,
            status_tokens: Mutex::new(Vec::new()),
        })
    }

    async fn create_gatt_session(device: &BluetoothLEDevice) -> Result<GattSession> {
        let device_id = device.BluetoothDeviceId()?;
        let session = GattSession::FromDeviceIdAsync(&device_id)?.await?;
        session.SetMaintainConnection(true)?;
        Ok(session)
    }
}

#[async_trait]
impl BleTransport for WinRtTransport {
    type Link = WinRtLink;

    async fn scan(&self, address: BleAddress) -> Result<ScanResult> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scanner = BleScanner::new();
        scanner.start(address, tx)?;

        let found = rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("scan ended before {} was seen", address))?;
        scanner.stop()?;
        Ok(found)
    }

    async fn connect(&self, address: BleAddress, timeout: Option<Duration>) -> Result<WinRtLink> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.open(address))
                .await
                .map_err(|_| anyhow!("connecting to {} timed out", address))?,
            None => self.open(address).await,
        }
    }
}

pub struct WinRtLink {
    device: BluetoothLEDevice,
    _session: Option<GattSession>,
    status_tokens: Mutex<Vec<i64>>,
}

#[async_trait]
impl BleLink for WinRtLink {
    type Endpoint = WinRtEndpoint;

    async fn discover(&self) -> Result<Vec<DiscoveredService<WinRtEndpoint>>> {
        let services_result = self
            .device
            .GetGattServicesWithCacheModeAsync(BluetoothCacheMode::Uncached)?
            .await?;
        if services_result.Status()? != GattCommunicationStatus::Success {
            bail!("Failed to get GATT services: {:?}", services_result.Status()?);
        }

        let services = services_result.Services()?;
        let mut discovered = Vec::with_capacity(services.Size()? as usize);

        for i in 0..services.Size()? {
            let service = services.GetAt(i)?;
            let service_uuid = from_guid(&service.Uuid()?);

            let chars_result = service
                .GetCharacteristicsWithCacheModeAsync(BluetoothCacheMode::Uncached)?
                .await?;
            if chars_result.Status()? != GattCommunicationStatus::Success {
                bail!("Failed to get characteristics for service {}", service_uuid);
            }

            let characteristics = chars_result.Characteristics()?;
            let mut found = Vec::with_capacity(characteristics.Size()? as usize);
            for j in 0..characteristics.Size()? {
                let characteristic = characteristics.GetAt(j)?;
                let uuid = from_guid(&characteristic.Uuid()?);
                found.push((uuid, WinRtEndpoint { characteristic }));
            }
            debug!("Service {}: {} characteristics", service_uuid, found.len());

            discovered.push(DiscoveredService {
                uuid: service_uuid,
                characteristics: found,
            });
        }

        Ok(discovered)
    }

    fn events(&self) -> Result<mpsc::UnboundedReceiver<LinkEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler =
            TypedEventHandler::new(move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
                if let Some(dev) = dev.as_ref() {
                    if let Ok(status) = dev.ConnectionStatus() {
                        let event = match status {
                            BluetoothConnectionStatus::Connected => LinkEvent::Connected,
                            _ => LinkEvent::Disconnected,
                        };
                        let _ = tx.send(event);
                    }
                }
                Ok(())
            });
        let token = self.device.ConnectionStatusChanged(&handler)?;
        if let Ok(mut tokens) = self.status_tokens.lock() {
            tokens.push(token);
        }
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        self.device
            .ConnectionStatus()
            .map(|s| s == BluetoothConnectionStatus::Connected)
            .unwrap_or(false)
    }
}

impl Drop for WinRtLink {
    fn drop(&mut self) {
        if let Ok(mut tokens) = self.status_tokens.lock() {
            for token in tokens.drain(..) {
                let _ = self.device.RemoveConnectionStatusChanged(token);
            }
        }
        let _ = self.device.Close();
    }
}

pub struct WinRtEndpoint {
    characteristic: GattCharacteristic,
}

#[async_trait]
impl GattEndpoint for WinRtEndpoint {
    async fn read_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let result = self
            .characteristic
            .ReadValueWithCacheModeAsync(BluetoothCacheMode::Uncached)?
            .await?;
        if result.Status()? != GattCommunicationStatus::Success {
            bail!("Read failed with status {:?}", result.Status()?);
        }

        let reader = DataReader::FromBuffer(&result.Value()?)?;
        let length = reader.UnconsumedBufferLength()? as usize;
        let start = out.len();
        out.resize(start + length, 0);
        reader.ReadBytes(&mut out[start..])?;
        Ok(())
    }

    async fn write_without_response(&self, data: &[u8]) -> Result<()> {
        let writer = DataWriter::new()?;
        writer.WriteBytes(data)?;
        let buffer = writer.DetachBuffer()?;

        let status = self
            .characteristic
            .WriteValueWithOptionAsync(&buffer, GattWriteOption::WriteWithoutResponse)?
            .await?;
        if status != GattCommunicationStatus::Success {
            bail!("Write failed with status {:?}", status);
        }
        Ok(())
    }
}
