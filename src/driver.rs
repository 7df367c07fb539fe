//! BLE IR Driver
//!
//! Caller-facing handle to one infrared blaster. Construction performs the
//! initial scan + connect + discovery, then starts the device actor and the
//! connection supervisor as background tasks. After that, link drops and
//! recoveries are handled internally; callers only see the outcome of each
//! operation (`NotConnected` while the link is down).

use crate::domain::error::IrError;
use crate::domain::models::{BleAddress, ConnectionState};
use crate::domain::settings::DriverConfig;
use crate::domain::waveform;
use crate::infrastructure::bluetooth::actor::{ActorHandle, DeviceActor, REQUEST_QUEUE_DEPTH};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::supervisor::ConnectionSupervisor;
use crate::infrastructure::bluetooth::transport::BleTransport;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct BleIrDriver {
    address: BleAddress,
    actor: ActorHandle,
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    request_timeout: Option<Duration>,
}

impl BleIrDriver {
    /// Connect to the blaster at `address`.
    ///
    /// `cancel` aborts the initial connect when it completes first, e.g.
    /// `tokio::signal::ctrl_c()` or a sleep. It has no effect afterwards.
    pub async fn connect<T, C>(
        transport: T,
        address: BleAddress,
        config: DriverConfig,
        cancel: C,
    ) -> Result<Self, IrError>
    where
        T: BleTransport,
        C: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Unbound);
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);

        let supervisor = ConnectionSupervisor::new(
            Arc::new(transport),
            address,
            &config,
            session_tx,
            state_tx,
            shutdown_rx.clone(),
        );

        let initial = async {
            match config.initial_connect_timeout {
                Some(limit) => tokio::time::timeout(limit, supervisor.connect_initial())
                    .await
                    .unwrap_or_else(|_| {
                        Err(anyhow::anyhow!("timed out connecting to {} after {:?}", address, limit)
                            .into())
                    }),
                None => supervisor.connect_initial().await,
            }
        };

        let outcome = tokio::select! {
            result = initial => Some(result),
            _ = cancel => None,
        };
        let (session, bound) = match outcome {
            Some(Ok(bound)) => bound,
            Some(Err(e)) => {
                error!("Could not connect to {}: {}", address, e);
                return Err(e);
            }
            None => {
                info!("Connect to {} cancelled", address);
                return Err(IrError::Cancelled);
            }
        };

        let actor = DeviceActor::new(Some(session), request_rx, session_rx, shutdown_rx);
        let tasks = vec![
            tokio::spawn(actor.run()),
            tokio::spawn(supervisor.run(bound)),
        ];

        info!("Driver ready for {}", address);
        Ok(Self {
            address,
            actor: ActorHandle::new(request_tx),
            state: state_rx,
            shutdown: shutdown_tx,
            tasks: Mutex::new(tasks),
            request_timeout: config.request_timeout,
        })
    }

    pub fn address(&self) -> BleAddress {
        self.address
    }

    /// Encode pulse durations (nanoseconds) and transmit them.
    pub async fn send_infrared(&self, pulses_ns: &[u32]) -> Result<(), IrError> {
        self.send_infrared_with_timeout(pulses_ns, self.request_timeout)
            .await
    }

    pub async fn send_infrared_with_timeout(
        &self,
        pulses_ns: &[u32],
        timeout: Option<Duration>,
    ) -> Result<(), IrError> {
        self.send_samples_with_timeout(waveform::encode_pulses(pulses_ns), timeout)
            .await
    }

    /// Transmit an already-encoded sample sequence.
    pub async fn send_samples(&self, samples: Vec<i16>) -> Result<(), IrError> {
        self.send_samples_with_timeout(samples, self.request_timeout)
            .await
    }

    pub async fn send_samples_with_timeout(
        &self,
        samples: Vec<i16>,
        timeout: Option<Duration>,
    ) -> Result<(), IrError> {
        // Fail fast; the session checks again before any write
        protocol::validate_length(&samples)?;
        self.actor.send_infrared(samples, timeout).await
    }

    pub async fn get_firmware_version(&self) -> Result<String, IrError> {
        self.get_firmware_version_with_timeout(self.request_timeout)
            .await
    }

    pub async fn get_firmware_version_with_timeout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<String, IrError> {
        self.actor.get_version(timeout).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the background tasks and wait for them. Later calls return immediately.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if tasks.is_empty() {
            return;
        }

        info!("Shutting down driver for {}...", self.address);
        for task in tasks {
            if let Err(e) = task.await {
                error!("Driver task ended abnormally: {}", e);
            }
        }
        info!("Driver for {} shut down", self.address);
    }
}

impl Drop for BleIrDriver {
    fn drop(&mut self) {
        // Signal only; joining needs an async context
        self.shutdown.send_replace(true);
    }
}
