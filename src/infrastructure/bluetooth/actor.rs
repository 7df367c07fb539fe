//! Device Actor
//!
//! The single serialization point between callers and the connection.
//! Requests arrive over a bounded queue, each carrying a one-shot reply
//! slot; the actor runs them one at a time against the current session,
//! so protocol bytes from two callers never interleave.

use crate::domain::error::IrError;
use crate::infrastructure::bluetooth::session::DeviceSession;
use crate::infrastructure::bluetooth::supervisor::SessionUpdate;
use crate::infrastructure::bluetooth::transport::BleLink;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Requests waiting for the actor beyond this block their callers
pub const REQUEST_QUEUE_DEPTH: usize = 16;

/// A caller request with its reply slot
pub enum Request {
    SendInfrared {
        samples: Vec<i16>,
        reply: oneshot::Sender<Result<(), IrError>>,
    },
    GetVersion {
        reply: oneshot::Sender<Result<String, IrError>>,
    },
}

impl Request {
    /// The caller stopped waiting (timed out or was dropped)
    fn is_abandoned(&self) -> bool {
        match self {
            Self::SendInfrared { reply, .. } => reply.is_closed(),
            Self::GetVersion { reply } => reply.is_closed(),
        }
    }

    fn reject(self, error: IrError) {
        match self {
            Self::SendInfrared { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Self::GetVersion { reply } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

pub struct DeviceActor<L: BleLink> {
    session: Option<DeviceSession<L>>,
    requests: mpsc::Receiver<Request>,
    sessions: mpsc::UnboundedReceiver<SessionUpdate<L>>,
    shutdown: watch::Receiver<bool>,
}

impl<L: BleLink> DeviceActor<L> {
    pub fn new(
        session: Option<DeviceSession<L>>,
        requests: mpsc::Receiver<Request>,
        sessions: mpsc::UnboundedReceiver<SessionUpdate<L>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            requests,
            sessions,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut sessions_open = true;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            // Session updates win over requests so a request never runs
            // against a session the supervisor already replaced.
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                update = self.sessions.recv(), if sessions_open => match update {
                    Some(SessionUpdate::Bound(session)) => {
                        info!("Device session bound");
                        self.session = Some(session);
                    }
                    Some(SessionUpdate::Lost) => {
                        info!("Device session lost");
                        self.session = None;
                    }
                    None => sessions_open = false,
                },
                request = self.requests.recv() => match request {
                    Some(request) => self.dispatch(request).await,
                    None => break,
                },
            }
        }

        self.drain();
        info!("Device actor stopped");
    }

    async fn dispatch(&mut self, request: Request) {
        if request.is_abandoned() {
            debug!("Skipping request abandoned by its caller");
            return;
        }

        let Some(session) = self.session.as_mut() else {
            debug!("Request rejected: no session bound");
            request.reject(IrError::NotConnected);
            return;
        };

        match request {
            Request::SendInfrared { samples, reply } => {
                debug!("Sending {} samples", samples.len());
                let result = session.send_infrared(&samples).await;
                if let Err(e) = &result {
                    warn!("Infrared send failed: {}", e);
                }
                let _ = reply.send(result);
            }
            Request::GetVersion { reply } => {
                let result = session.firmware_version().await;
                if let Err(e) = &result {
                    warn!("Firmware version read failed: {}", e);
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Refuse new requests and answer everything still queued.
    fn drain(&mut self) {
        self.requests.close();
        let mut rejected = 0;
        while let Ok(request) = self.requests.try_recv() {
            request.reject(IrError::DriverStopped);
            rejected += 1;
        }
        if rejected > 0 {
            debug!("Rejected {} queued requests on shutdown", rejected);
        }
    }
}

/// Cloneable sending side of the actor's queue
#[derive(Clone)]
pub struct ActorHandle {
    requests: mpsc::Sender<Request>,
}

impl ActorHandle {
    pub fn new(requests: mpsc::Sender<Request>) -> Self {
        Self { requests }
    }

    pub async fn send_infrared(
        &self,
        samples: Vec<i16>,
        timeout: Option<Duration>,
    ) -> Result<(), IrError> {
        self.call(|reply| Request::SendInfrared { samples, reply }, timeout)
            .await
    }

    pub async fn get_version(&self, timeout: Option<Duration>) -> Result<String, IrError> {
        self.call(|reply| Request::GetVersion { reply }, timeout)
            .await
    }

    /// Enqueue a request and wait for its reply. `timeout` bounds the whole
    /// wait, queueing included; it does not cancel an operation in flight.
    async fn call<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<R, IrError>>) -> Request,
        timeout: Option<Duration>,
    ) -> Result<R, IrError> {
        let (reply, response) = oneshot::channel();
        let wait = async {
            self.requests
                .send(make(reply))
                .await
                .map_err(|_| IrError::DriverStopped)?;
            response.await.map_err(|_| IrError::DriverStopped)?
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .unwrap_or(Err(IrError::ReplyTimeout)),
            None => wait.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::mock::{MockDevice, MockLink};
    use crate::infrastructure::bluetooth::protocol::{chunk_uuid, IR_SEND_UUID, IR_STATUS_UUID};
    use crate::infrastructure::bluetooth::transport::BleTransport;
    use std::sync::Arc;

    struct Harness {
        handle: ActorHandle,
        sessions: mpsc::UnboundedSender<SessionUpdate<MockLink>>,
        shutdown: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_actor(session: Option<DeviceSession<MockLink>>) -> Harness {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let actor = DeviceActor::new(session, request_rx, session_rx, shutdown_rx);
        Harness {
            handle: ActorHandle::new(request_tx),
            sessions: session_tx,
            shutdown,
            task: tokio::spawn(actor.run()),
        }
    }

    async fn session_for(device: &MockDevice) -> DeviceSession<MockLink> {
        let link = device
            .transport()
            .connect(device.address(), None)
            .await
            .unwrap();
        DeviceSession::establish(Arc::new(link)).await.unwrap()
    }

    #[tokio::test]
    async fn test_no_session_replies_not_connected() {
        let h = spawn_actor(None);

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            h.handle.send_infrared(vec![1, 2, 3], None),
        )
        .await
        .expect("actor blocked");

        assert!(matches!(result, Err(IrError::NotConnected)));
        assert!(matches!(
            h.handle.get_version(None).await,
            Err(IrError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let device = MockDevice::new();
        device.set_write_delay(Duration::from_millis(1));
        let h = spawn_actor(Some(session_for(&device).await));

        let a = h.handle.clone();
        let b = h.handle.clone();
        let first = tokio::spawn(async move { a.send_infrared(vec![111; 45], None).await });
        let second = tokio::spawn(async move { b.send_infrared(vec![222; 45], None).await });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // 45 samples = 90 bytes = 5 chunks, + size + trigger + status read
        let ops = device.ops();
        assert_eq!(ops.len(), 16);
        let (one, two) = ops.split_at(8);
        for block in [one, two] {
            assert_eq!(block[6].characteristic(), IR_SEND_UUID);
            assert_eq!(block[7].characteristic(), IR_STATUS_UUID);
            let marker = block[0].data().unwrap()[0];
            for op in &block[..5] {
                assert!(op.data().unwrap()[..10].iter().step_by(2).all(|b| *b == marker));
            }
        }
        assert_ne!(one[0].data(), two[0].data());
    }

    #[tokio::test]
    async fn test_transport_error_leaves_next_request_unaffected() {
        let device = MockDevice::new();
        device.fail_write_to(chunk_uuid(1).unwrap());
        device.set_write_delay(Duration::from_millis(5));
        let h = spawn_actor(Some(session_for(&device).await));

        // 15 samples need chunk 1, 5 samples fit in chunk 0
        let failing = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.send_infrared(vec![3; 15], None).await })
        };
        let queued = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.send_infrared(vec![4; 5], None).await })
        };

        assert!(matches!(failing.await.unwrap(), Err(IrError::Transport(_))));
        queued.await.unwrap().unwrap();

        let ops = device.ops();
        let tail = &ops[ops.len() - 4..];
        assert_eq!(tail[0].data().unwrap()[..10], [4, 0, 4, 0, 4, 0, 4, 0, 4, 0]);
        assert_eq!(tail[2].characteristic(), IR_SEND_UUID);
        assert_eq!(tail[3].characteristic(), IR_STATUS_UUID);
    }

    #[tokio::test]
    async fn test_session_update_replaces_session() {
        let old = MockDevice::new();
        let h = spawn_actor(Some(session_for(&old).await));

        h.sessions.send(SessionUpdate::Lost).unwrap();
        assert!(matches!(
            h.handle.send_infrared(vec![1], None).await,
            Err(IrError::NotConnected)
        ));

        let new = MockDevice::new();
        h.sessions
            .send(SessionUpdate::Bound(session_for(&new).await))
            .unwrap();
        h.handle.send_infrared(vec![1], None).await.unwrap();

        assert!(old.ops().is_empty());
        assert_eq!(new.ops().len(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_answers_queued_callers() {
        let device = MockDevice::new();
        device.set_write_delay(Duration::from_millis(50));
        let h = spawn_actor(Some(session_for(&device).await));

        let in_flight = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.send_infrared(vec![7; 10], None).await })
        };
        // let the actor pick up the first request
        tokio::time::sleep(Duration::from_millis(10)).await;
        let queued = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.send_infrared(vec![8; 10], None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.shutdown.send_replace(true);
        h.task.await.unwrap();

        // the in-flight send completes, the queued one is refused
        assert!(in_flight.await.unwrap().is_ok());
        assert!(matches!(
            queued.await.unwrap(),
            Err(IrError::DriverStopped)
        ));
        assert!(matches!(
            h.handle.send_infrared(vec![1], None).await,
            Err(IrError::DriverStopped)
        ));
    }

    #[tokio::test]
    async fn test_reply_timeout_abandons_request() {
        let device = MockDevice::new();
        device.set_write_delay(Duration::from_millis(100));
        let h = spawn_actor(Some(session_for(&device).await));

        let result = h
            .handle
            .send_infrared(vec![1; 10], Some(Duration::from_millis(20)))
            .await;
        assert!(matches!(result, Err(IrError::ReplyTimeout)));
    }
}
