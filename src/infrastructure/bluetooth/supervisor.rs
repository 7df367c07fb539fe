//! Connection Supervisor
//!
//! Owns scanning, connecting and reconnection for one target address and
//! publishes every freshly built [`DeviceSession`] to the device actor.
//!
//! ```text
//!            ┌────────── scan + connect + discover ──────────┐
//!            │                                               ▼
//!        Unbound ──► Connecting ──────────────────────────► Bound
//!                       ▲   │ attempt failed                 │ drop notification
//!                       │   ▼                                │ or failed health check
//!                   ReconnectPending ◄───────────────────────┘
//!
//!   shutdown signal: any state ──► Shutdown
//! ```
//!
//! Reconnection has no backoff and no overall deadline; it keeps trying
//! until a link comes back or the driver shuts down.

use crate::domain::error::IrError;
use crate::domain::models::{BleAddress, ConnectionState, LinkEvent};
use crate::domain::settings::DriverConfig;
use crate::infrastructure::bluetooth::session::DeviceSession;
use crate::infrastructure::bluetooth::transport::{BleLink, BleTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Message from the supervisor to the actor
pub enum SessionUpdate<L: BleLink> {
    /// A new connection is ready; replaces whatever session the actor holds
    Bound(DeviceSession<L>),
    /// The current connection dropped; the old session must not be used
    Lost,
}

/// The supervisor's view of a bound connection
pub struct BoundLink<L> {
    link: Arc<L>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

pub struct ConnectionSupervisor<T: BleTransport> {
    transport: Arc<T>,
    address: BleAddress,
    reconnect_timeout: Duration,
    discovery_timeout: Duration,
    health_check_interval: Option<Duration>,
    sessions: mpsc::UnboundedSender<SessionUpdate<T::Link>>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<bool>,
}

impl<T: BleTransport> ConnectionSupervisor<T> {
    pub fn new(
        transport: Arc<T>,
        address: BleAddress,
        config: &DriverConfig,
        sessions: mpsc::UnboundedSender<SessionUpdate<T::Link>>,
        state: watch::Sender<ConnectionState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            address,
            reconnect_timeout: config.reconnect_timeout,
            discovery_timeout: config.discovery_timeout,
            health_check_interval: config.health_check_interval,
            sessions,
            state,
            shutdown,
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = *self.state.borrow();
        if prev == next {
            return;
        }
        if !prev.can_transition_to(next) {
            warn!("Unexpected connection state change: {} -> {}", prev, next);
        }
        debug!("Connection state: {} -> {}", prev, next);
        self.state.send_replace(next);
    }

    /// Startup path: scan for the target, connect, and discover.
    pub async fn connect_initial(
        &self,
    ) -> Result<(DeviceSession<T::Link>, BoundLink<T::Link>), IrError> {
        self.set_state(ConnectionState::Connecting);

        let result = async {
            info!("Scanning for {}...", self.address);
            let found = self.transport.scan(self.address).await?;
            info!(
                "Found device {} ({}, {} dBm), connecting...",
                found.address, found.name, found.signal_strength
            );

            let link = self.transport.connect(found.address, None).await?;
            self.bind(link).await
        }
        .await;

        match &result {
            Ok(_) => info!("Connected to {}", self.address),
            Err(e) => {
                warn!("Initial connection to {} failed: {}", self.address, e);
                self.set_state(ConnectionState::Unbound);
            }
        }
        result
    }

    /// Subscribe to link events and build the session for a fresh link.
    async fn bind(
        &self,
        link: T::Link,
    ) -> Result<(DeviceSession<T::Link>, BoundLink<T::Link>), IrError> {
        // Subscribe first so a drop during discovery is not missed
        let events = link.events()?;
        let link = Arc::new(link);
        let session = DeviceSession::establish(link.clone()).await?;
        Ok((session, BoundLink { link, events }))
    }

    /// Supervise `initial` and every connection after it until shutdown.
    pub async fn run(self, initial: BoundLink<T::Link>) {
        let mut shutdown = self.shutdown.clone();
        let mut current = Some(initial);

        loop {
            let bound = match current.take() {
                Some(bound) => bound,
                None => match self.reconnect(&mut shutdown).await {
                    Some((session, bound)) => {
                        if self.sessions.send(SessionUpdate::Bound(session)).is_err() {
                            debug!("Device actor gone, supervisor stopping");
                            break;
                        }
                        bound
                    }
                    None => break,
                },
            };

            self.set_state(ConnectionState::Bound);
            if !self.watch_link(bound, &mut shutdown).await {
                break;
            }

            let _ = self.sessions.send(SessionUpdate::Lost);
            self.set_state(ConnectionState::ReconnectPending);
        }

        self.set_state(ConnectionState::Shutdown);
        info!("Connection supervisor stopped");
    }

    /// Wait for the bound link to drop. Returns `false` on shutdown.
    async fn watch_link(
        &self,
        mut bound: BoundLink<T::Link>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut health = self.health_check_interval.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            if *shutdown.borrow() {
                return false;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => return false,
                event = bound.events.recv() => match event {
                    Some(LinkEvent::Disconnected) => {
                        warn!("Device disconnected: {}", self.address);
                        return true;
                    }
                    Some(LinkEvent::Connected) => debug!("Link reports connected"),
                    None => {
                        warn!("Link event stream closed for {}", self.address);
                        return true;
                    }
                },
                _ = tick(&mut health) => {
                    if !bound.link.is_connected() {
                        warn!("Health check found {} disconnected", self.address);
                        return true;
                    }
                }
            }
        }
    }

    /// Retry until a link is rebuilt or shutdown is signalled. Entered in
    /// `ReconnectPending`; every attempt leaves it for `Connecting`.
    async fn reconnect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<(DeviceSession<T::Link>, BoundLink<T::Link>)> {
        let mut attempt: u64 = 0;

        loop {
            // Pending state stays visible to watchers between attempts
            tokio::task::yield_now().await;
            if *shutdown.borrow() {
                return None;
            }
            attempt += 1;
            self.set_state(ConnectionState::Connecting);

            let result = tokio::select! {
                biased;
                _ = shutdown.changed() => return None,
                result = self.try_reconnect() => result,
            };

            match result {
                Ok(bound) => {
                    info!("Reconnected to {} after {} attempt(s)", self.address, attempt);
                    return Some(bound);
                }
                Err(e) if attempt == 1 => {
                    warn!("Reconnect to {} failed: {}. Retrying...", self.address, e)
                }
                Err(e) => debug!("Reconnect attempt {} failed: {}", attempt, e),
            }

            self.set_state(ConnectionState::ReconnectPending);
        }
    }

    /// One attempt: open the link within `reconnect_timeout`, then discover
    /// within `discovery_timeout`.
    async fn try_reconnect(
        &self,
    ) -> Result<(DeviceSession<T::Link>, BoundLink<T::Link>), IrError> {
        let link = tokio::time::timeout(
            self.reconnect_timeout,
            self.transport
                .connect(self.address, Some(self.reconnect_timeout)),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!("connect timed out after {:?}", self.reconnect_timeout)
        })??;

        tokio::time::timeout(self.discovery_timeout, self.bind(link))
            .await
            .map_err(|_| {
                anyhow::anyhow!("discovery timed out after {:?}", self.discovery_timeout)
            })?
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
