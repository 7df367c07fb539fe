//! In-memory transport used by the driver tests.
//!
//! Every connect bumps a generation counter. Endpoints remember the
//! generation they were discovered under and refuse I/O once it is stale,
//! so a test can prove old handles are never reused after a reconnect.

use crate::domain::models::{BleAddress, LinkEvent};
use crate::infrastructure::bluetooth::protocol::{
    chunk_count, chunk_uuid, FIRMWARE_VERSION_UUID, IR_DATA_SIZE_UUID, IR_SEND_UUID,
    IR_SERVICE_UUID, IR_STATUS_UUID, MAX_SAMPLES,
};
use crate::infrastructure::bluetooth::transport::{
    BleLink, BleTransport, DiscoveredService, GattEndpoint, ScanResult,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::{uuid, Uuid};

const DEVICE_INFORMATION_SERVICE_UUID: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// A recorded characteristic access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Write {
        generation: u32,
        characteristic: Uuid,
        data: Vec<u8>,
    },
    Read {
        generation: u32,
        characteristic: Uuid,
    },
}

impl Op {
    pub fn write(generation: u32, characteristic: Uuid, data: Vec<u8>) -> Self {
        Self::Write {
            generation,
            characteristic,
            data,
        }
    }

    pub fn read(generation: u32, characteristic: Uuid) -> Self {
        Self::Read {
            generation,
            characteristic,
        }
    }

    pub fn generation(&self) -> u32 {
        match self {
            Self::Write { generation, .. } | Self::Read { generation, .. } => *generation,
        }
    }

    pub fn characteristic(&self) -> Uuid {
        match self {
            Self::Write { characteristic, .. } | Self::Read { characteristic, .. } => {
                *characteristic
            }
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Write { data, .. } => Some(data),
            Self::Read { .. } => None,
        }
    }
}

struct MockState {
    generation: u32,
    connected: bool,
    visible: bool,
    status: i8,
    firmware: Vec<u8>,
    ops: Vec<Op>,
    failing_writes: HashSet<Uuid>,
    hidden: HashSet<Uuid>,
    connect_failures: usize,
    connect_attempts: usize,
    write_delay: Option<Duration>,
    connect_delay: Option<Duration>,
    discover_delay: Option<Duration>,
    empty_status: bool,
    events: Vec<mpsc::UnboundedSender<LinkEvent>>,
}

/// Scriptable fake peripheral; clones share state
#[derive(Clone)]
pub struct MockDevice {
    address: BleAddress,
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            address: BleAddress::from_u64(0xD44D1FFC2986),
            state: Arc::new(Mutex::new(MockState {
                generation: 0,
                connected: false,
                visible: true,
                status: 0,
                firmware: b"0.1.0".to_vec(),
                ops: Vec::new(),
                failing_writes: HashSet::new(),
                hidden: HashSet::new(),
                connect_failures: 0,
                connect_attempts: 0,
                write_delay: None,
                connect_delay: None,
                discover_delay: None,
                empty_status: false,
                events: Vec::new(),
            })),
        }
    }

    pub fn address(&self) -> BleAddress {
        self.address
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport {
            device: self.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    pub fn generation(&self) -> u32 {
        self.lock().generation
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn set_status(&self, code: i8) {
        self.lock().status = code;
    }

    pub fn set_firmware_version(&self, raw: &[u8]) {
        self.lock().firmware = raw.to_vec();
    }

    pub fn set_visible(&self, visible: bool) {
        self.lock().visible = visible;
    }

    pub fn fail_write_to(&self, characteristic: Uuid) {
        self.lock().failing_writes.insert(characteristic);
    }

    pub fn hide_characteristic(&self, characteristic: Uuid) {
        self.lock().hidden.insert(characteristic);
    }

    /// Fail the next `count` connect attempts
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().connect_failures = count;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.lock().write_delay = Some(delay);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = Some(delay);
    }

    pub fn set_discover_delay(&self, delay: Duration) {
        self.lock().discover_delay = Some(delay);
    }

    /// Status reads return zero bytes
    pub fn set_empty_status(&self, empty: bool) {
        self.lock().empty_status = empty;
    }

    /// Drop the link and notify subscribers
    pub fn drop_link(&self) {
        let mut state = self.lock();
        state.connected = false;
        state
            .events
            .retain(|tx| tx.send(LinkEvent::Disconnected).is_ok());
    }

    /// Drop the link without any notification; only a liveness poll notices
    pub fn drop_link_silently(&self) {
        self.lock().connected = false;
    }
}

pub struct MockTransport {
    device: MockDevice,
}

#[async_trait]
impl BleTransport for MockTransport {
    type Link = MockLink;

    async fn scan(&self, address: BleAddress) -> Result<ScanResult> {
        let visible = self.device.lock().visible && address == self.device.address;
        if !visible {
            std::future::pending::<()>().await;
        }
        Ok(ScanResult {
            address,
            name: "IR Blaster".to_string(),
            signal_strength: -48,
        })
    }

    async fn connect(&self, address: BleAddress, _timeout: Option<Duration>) -> Result<MockLink> {
        let delay = self.device.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let generation = {
            let mut state = self.device.lock();
            state.connect_attempts += 1;
            if address != self.device.address {
                bail!("no device at {}", address);
            }
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                bail!("connection attempt failed");
            }
            state.generation += 1;
            state.connected = true;
            state.generation
        };
        Ok(MockLink {
            device: self.device.clone(),
            generation,
        })
    }
}

pub struct MockLink {
    device: MockDevice,
    generation: u32,
}

#[async_trait]
impl BleLink for MockLink {
    type Endpoint = MockEndpoint;

    async fn discover(&self) -> Result<Vec<DiscoveredService<MockEndpoint>>> {
        let delay = self.device.lock().discover_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let hidden = self.device.lock().hidden.clone();
        let endpoint = |uuid: Uuid| {
            (
                uuid,
                MockEndpoint {
                    device: self.device.clone(),
                    generation: self.generation,
                    uuid,
                },
            )
        };

        let mut ir_uuids: Vec<Uuid> = (0..chunk_count(MAX_SAMPLES))
            .filter_map(chunk_uuid)
            .collect();
        ir_uuids.extend([IR_DATA_SIZE_UUID, IR_SEND_UUID, IR_STATUS_UUID]);

        Ok(vec![
            DiscoveredService {
                uuid: IR_SERVICE_UUID,
                characteristics: ir_uuids
                    .into_iter()
                    .filter(|uuid| !hidden.contains(uuid))
                    .map(endpoint)
                    .collect(),
            },
            DiscoveredService {
                uuid: DEVICE_INFORMATION_SERVICE_UUID,
                characteristics: vec![endpoint(FIRMWARE_VERSION_UUID)],
            },
        ])
    }

    fn events(&self) -> Result<mpsc::UnboundedReceiver<LinkEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.device.lock().events.push(tx);
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        let state = self.device.lock();
        state.connected && state.generation == self.generation
    }
}

pub struct MockEndpoint {
    device: MockDevice,
    generation: u32,
    uuid: Uuid,
}

impl MockEndpoint {
    fn check_live(&self, state: &MockState) -> Result<()> {
        if state.generation != self.generation {
            bail!(
                "stale handle {} from connection {} (current {})",
                self.uuid,
                self.generation,
                state.generation
            );
        }
        if !state.connected {
            bail!("link is down");
        }
        Ok(())
    }
}

#[async_trait]
impl GattEndpoint for MockEndpoint {
    async fn read_into(&self, out: &mut Vec<u8>) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.device.lock();
        self.check_live(&state)?;
        state.ops.push(Op::read(self.generation, self.uuid));

        if self.uuid == IR_STATUS_UUID {
            if !state.empty_status {
                out.push(state.status as u8);
            }
        } else if self.uuid == FIRMWARE_VERSION_UUID {
            out.extend_from_slice(&state.firmware);
        }
        Ok(())
    }

    async fn write_without_response(&self, data: &[u8]) -> Result<()> {
        let delay = self.device.lock().write_delay;
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let mut state = self.device.lock();
        self.check_live(&state)?;
        if state.failing_writes.contains(&self.uuid) {
            bail!("write to {} failed", self.uuid);
        }
        state
            .ops
            .push(Op::write(self.generation, self.uuid, data.to_vec()));
        Ok(())
    }
}
