/*!
 # Keep-alive transport

 Some controllers need a very large number of connection attempts after a
 period without traffic. Connecting on a regular basis, even without sending
 anything, keeps them responsive.

 One worker task per device owns the command queue and is the only place
 that connects to the device. It waits for a command for at most the
 keep-alive interval; a command is written with connect, write and close,
 and an idle interval produces a connect and close cycle with no write.
 Commands are handled in the order they were queued. Failed cycles are
 logged and dropped.
*/

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::ble::BleBackend;
use crate::direct::connect_with_retry;
use crate::encoding::CONTROL_HANDLE;
use crate::transport::Transport;
use crate::{Error, Result};

/// Default idle time before a keep-alive connection is made
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of connection attempts per cycle
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Cycles needing more attempts than this are logged as slow
const SLOW_CONNECT_ATTEMPTS: u32 = 11;

#[derive(Debug)]
struct QueuedWrite {
    handle: u16,
    data: Vec<u8>,
}

struct Worker {
    backend: Arc<dyn BleBackend>,
    address: String,
    interval: Duration,
    max_attempts: u32,
    queue: mpsc::UnboundedReceiver<QueuedWrite>,
}

impl Worker {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn run(mut self) {
        info!(
            "Keep-alive worker started (interval {:?}, {} attempts)",
            self.interval, self.max_attempts
        );

        loop {
            let next = match time::timeout(self.interval, self.queue.recv()).await {
                Ok(Some(write)) => Some(write),
                // Every sender is gone and the queue is drained
                Ok(None) => break,
                Err(_) => None,
            };
            self.cycle(next).await;
        }

        debug!("Keep-alive worker stopped");
    }

    async fn cycle(&self, write: Option<QueuedWrite>) {
        let (handle, data) = match &write {
            Some(w) => {
                trace!("Writing {} bytes to handle {:#06x}", w.data.len(), w.handle);
                (w.handle, Some(w.data.as_slice()))
            }
            None => {
                trace!("Idle, sending keep-alive");
                (CONTROL_HANDLE, None)
            }
        };

        let outcome = connect_with_retry(
            self.backend.as_ref(),
            &self.address,
            handle,
            data,
            self.max_attempts,
        )
        .await;

        if outcome.attempts > SLOW_CONNECT_ATTEMPTS {
            warn!(
                "Bluetooth connection to {} took {} attempts",
                self.address, outcome.attempts
            );
        }
        if !outcome.succeeded {
            match &outcome.last_error {
                Some(e) => error!(
                    "Dropping {} for {} after {} attempts: {}",
                    if write.is_some() { "write" } else { "keep-alive" },
                    self.address,
                    outcome.attempts,
                    e
                ),
                None => error!("No connection attempts made to {}", self.address),
            }
        }
    }
}

/// Owner side of a running keep-alive worker
pub struct KeepAliveHandle {
    address: String,
    sender: mpsc::UnboundedSender<QueuedWrite>,
    task: JoinHandle<()>,
}

impl KeepAliveHandle {
    /// Starts the worker on the current tokio runtime
    pub fn spawn(
        backend: Arc<dyn BleBackend>,
        address: impl Into<String>,
        interval: Duration,
        max_attempts: u32,
    ) -> Self {
        let address = address.into();
        let (sender, queue) = mpsc::unbounded_channel();
        let worker = Worker {
            backend,
            address: address.clone(),
            interval,
            max_attempts,
            queue,
        };
        let task = tokio::spawn(worker.run());

        KeepAliveHandle {
            address,
            sender,
            task,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Queues a write behind everything queued before it
    pub fn enqueue(&self, handle: u16, data: Vec<u8>) -> Result<()> {
        self.sender
            .send(QueuedWrite { handle, data })
            .map_err(|_| Error::WorkerStopped(self.address.clone()))
    }

    /// Closes the queue and waits until the worker has handled what was
    /// still queued
    pub async fn shutdown(self) -> Result<()> {
        drop(self.sender);
        self.task
            .await
            .map_err(|_| Error::WorkerStopped(self.address.clone()))
    }
}

/// Transport that hands every write to a [`KeepAliveHandle`]
pub struct KeepAliveTransport {
    worker: KeepAliveHandle,
}

impl KeepAliveTransport {
    /// Spawns a worker with the default interval and attempt budget
    pub fn spawn(backend: Arc<dyn BleBackend>, address: impl Into<String>) -> Self {
        Self::with_settings(backend, address, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_settings(
        backend: Arc<dyn BleBackend>,
        address: impl Into<String>,
        interval: Duration,
        max_attempts: u32,
    ) -> Self {
        KeepAliveTransport {
            worker: KeepAliveHandle::spawn(backend, address, interval, max_attempts),
        }
    }

    pub async fn shutdown(self) -> Result<()> {
        self.worker.shutdown().await
    }
}

impl Transport for KeepAliveTransport {
    fn write<'a>(&'a self, handle: u16, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.worker.enqueue(handle, payload.to_vec()) })
    }

    fn kind(&self) -> &'static str {
        "keep-alive"
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(self.shutdown())
    }
}
