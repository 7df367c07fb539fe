//! Device Session
//!
//! Binds one live link to the characteristic table discovered on it.
//! A session is built once per successful connection and thrown away on
//! disconnect; handles from an old connection are never reused.

use crate::domain::error::IrError;
use crate::infrastructure::bluetooth::protocol::{self, FIRMWARE_VERSION_UUID, IR_SERVICE_UUID};
use crate::infrastructure::bluetooth::transport::{BleLink, DiscoveredService, GattEndpoint};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// service UUID -> characteristic UUID -> endpoint handle
pub struct CharacteristicTable<E> {
    services: HashMap<Uuid, HashMap<Uuid, E>>,
}

impl<E: GattEndpoint> CharacteristicTable<E> {
    pub fn from_discovery(discovered: Vec<DiscoveredService<E>>) -> Self {
        let services = discovered
            .into_iter()
            .map(|service| {
                (
                    service.uuid,
                    service.characteristics.into_iter().collect::<HashMap<_, _>>(),
                )
            })
            .collect();
        Self { services }
    }

    pub fn get(&self, service: Uuid, characteristic: Uuid) -> Result<&E, IrError> {
        self.services
            .get(&service)
            .and_then(|chars| chars.get(&characteristic))
            .ok_or(IrError::MissingCharacteristic(characteristic))
    }

    /// Characteristic under the infrared service
    pub fn ir(&self, characteristic: Uuid) -> Result<&E, IrError> {
        self.get(IR_SERVICE_UUID, characteristic)
    }

    /// Look under the infrared service first, then under any other service.
    pub fn find(&self, characteristic: Uuid) -> Result<&E, IrError> {
        self.ir(characteristic).or_else(|_| {
            self.services
                .values()
                .find_map(|chars| chars.get(&characteristic))
                .ok_or(IrError::MissingCharacteristic(characteristic))
        })
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn characteristic_count(&self) -> usize {
        self.services.values().map(HashMap::len).sum()
    }
}

/// A connection plus its resolved characteristics and a reusable scratch buffer.
///
/// Operations take `&mut self`; the device actor is the only owner, so at
/// most one operation touches the link at a time.
pub struct DeviceSession<L: BleLink> {
    link: Arc<L>,
    table: CharacteristicTable<L::Endpoint>,
    scratch: Vec<u8>,
}

impl<L: BleLink> DeviceSession<L> {
    /// Discover services on `link` and build a session over them
    pub async fn establish(link: Arc<L>) -> Result<Self, IrError> {
        let discovered = link.discover().await?;
        let table = CharacteristicTable::from_discovery(discovered);
        info!(
            "Discovered {} services, {} characteristics",
            table.service_count(),
            table.characteristic_count()
        );
        Ok(Self::new(link, table))
    }

    pub fn new(link: Arc<L>, table: CharacteristicTable<L::Endpoint>) -> Self {
        Self {
            link,
            table,
            scratch: Vec::with_capacity(512),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Upload `samples`, trigger transmission, and decode the device status
    pub async fn send_infrared(&mut self, samples: &[i16]) -> Result<(), IrError> {
        self.ensure_connected()?;
        self.scratch.clear();

        protocol::upload(&self.table, samples, &mut self.scratch).await?;
        protocol::read_status(&self.table, &mut self.scratch).await
    }

    /// Read the firmware revision string
    pub async fn firmware_version(&mut self) -> Result<String, IrError> {
        self.ensure_connected()?;
        self.scratch.clear();

        // Firmware revision usually sits in Device Information, not the IR service
        self.table
            .find(FIRMWARE_VERSION_UUID)?
            .read_into(&mut self.scratch)
            .await?;

        let version = String::from_utf8_lossy(&self.scratch)
            .trim_end_matches('\0')
            .to_string();
        debug!("Firmware version: {}", version);
        Ok(version)
    }

    fn ensure_connected(&self) -> Result<(), IrError> {
        if self.link.is_connected() {
            Ok(())
        } else {
            Err(IrError::NotConnected)
        }
    }
}
