/*!
 # Direct-connection transport

 Opens a BLE connection per write, retrying the whole connect, write and
 close sequence. After the attempt budget is spent the last backend error is
 returned to the caller.
*/

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use crate::ble::{with_connection, BleBackend};
use crate::transport::Transport;
use crate::{Error, Result};

/// Default number of connection attempts per write
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How a sequence of connection attempts went
#[derive(Debug)]
pub struct RetryOutcome {
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Whether one of the attempts succeeded
    pub succeeded: bool,
    /// Error of the most recent failed attempt
    pub last_error: Option<Error>,
}

impl RetryOutcome {
    /// Number of attempts that failed
    pub fn failures(&self) -> u32 {
        if self.succeeded {
            self.attempts - 1
        } else {
            self.attempts
        }
    }

    /// Error of an earlier failed attempt when a later attempt succeeded.
    ///
    /// [`DirectTransport`] logs a warning exactly when this is `Some`.
    pub fn recovered_error(&self) -> Option<&Error> {
        if self.succeeded {
            self.last_error.as_ref()
        } else {
            None
        }
    }
}

/// Runs connect, optional write and close until one round succeeds or
/// `max_attempts` rounds have failed
#[instrument(skip(backend, data), fields(with_data = data.is_some()))]
pub async fn connect_with_retry(
    backend: &dyn BleBackend,
    address: &str,
    handle: u16,
    data: Option<&[u8]>,
    max_attempts: u32,
) -> RetryOutcome {
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match with_connection(backend, address, handle, data).await {
            Ok(()) => {
                return RetryOutcome {
                    attempts: attempt,
                    succeeded: true,
                    last_error,
                };
            }
            Err(e) => {
                debug!("Connection attempt {}/{} failed: {}", attempt, max_attempts, e);
                last_error = Some(e);
            }
        }
    }

    RetryOutcome {
        attempts: max_attempts,
        succeeded: false,
        last_error,
    }
}

/// Transport that connects directly through a [`BleBackend`]
pub struct DirectTransport {
    backend: Arc<dyn BleBackend>,
    address: String,
    max_attempts: u32,
}

impl DirectTransport {
    pub fn new(backend: Arc<dyn BleBackend>, address: impl Into<String>) -> Self {
        Self::with_max_attempts(backend, address, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(
        backend: Arc<dyn BleBackend>,
        address: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        DirectTransport {
            backend,
            address: address.into(),
            max_attempts,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Transport for DirectTransport {
    fn write<'a>(&'a self, handle: u16, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let outcome = connect_with_retry(
                self.backend.as_ref(),
                &self.address,
                handle,
                Some(payload),
                self.max_attempts,
            )
            .await;

            if outcome.succeeded {
                if let Some(e) = outcome.recovered_error() {
                    warn!(
                        "Write to {} succeeded after {} failed attempts, last error: {}",
                        self.address,
                        outcome.failures(),
                        e
                    );
                }
                return Ok(());
            }

            error!(
                "Write to {} failed after {} attempts",
                self.address, outcome.attempts
            );
            Err(outcome.last_error.unwrap_or_else(|| {
                Error::BleError(format!("no connection attempts made to {}", self.address))
            }))
        })
    }

    fn kind(&self) -> &'static str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::fake::{Event, FakeBackend};
    use crate::encoding::CONTROL_HANDLE;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::Level;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    /// Counts WARN events
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_warns_only_after_failed_attempts() {
        for k in 1..=10usize {
            let warnings = Arc::new(AtomicUsize::new(0));
            let subscriber =
                tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
            let _guard = tracing::subscriber::set_default(subscriber);

            let backend = FakeBackend::failing_connects(k - 1);
            let transport = DirectTransport::new(backend, ADDR);
            transport.write(CONTROL_HANDLE, &[0x02]).await.unwrap();

            let expected = if k > 1 { 1 } else { 0 };
            assert_eq!(warnings.load(Ordering::SeqCst), expected, "k={k}");
        }
    }

    #[tokio::test]
    async fn test_persistent_failure_returns_last_error() {
        let backend = FakeBackend::failing_connects(usize::MAX);
        let transport = DirectTransport::new(backend.clone(), ADDR);

        let err = transport.write(CONTROL_HANDLE, &[0x01]).await.unwrap_err();
        assert_eq!(backend.connect_attempts(), 10);
        match err {
            Error::BleError(msg) => assert_eq!(msg, "connect attempt 10 failed"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(backend.writes().is_empty());
    }

    #[tokio::test]
    async fn test_success_on_attempt_k() {
        for k in 1..=10usize {
            let backend = FakeBackend::failing_connects(k - 1);
            let outcome =
                connect_with_retry(backend.as_ref(), ADDR, CONTROL_HANDLE, Some(&[0x02]), 10).await;
            assert!(outcome.succeeded);
            assert_eq!(outcome.attempts as usize, k);
            assert_eq!(outcome.failures() as usize, k - 1);
            // The transport warns exactly when recovered_error is set
            assert_eq!(outcome.recovered_error().is_some(), k > 1);

            let backend = FakeBackend::failing_connects(k - 1);
            let transport = DirectTransport::new(backend.clone(), ADDR);
            assert!(transport.write(CONTROL_HANDLE, &[0x02]).await.is_ok());
            assert_eq!(backend.connect_attempts(), k);
            assert_eq!(backend.writes(), vec![(CONTROL_HANDLE, vec![0x02])]);
        }
    }

    #[tokio::test]
    async fn test_failed_write_closes_and_retries() {
        let backend = FakeBackend::failing_writes(2);
        let transport = DirectTransport::new(backend.clone(), ADDR);
        transport.write(CONTROL_HANDLE, &[0x03]).await.unwrap();

        let events = backend.events();
        let connects = events.iter().filter(|e| matches!(e, Event::Connect(_))).count();
        let closes = events.iter().filter(|e| **e == Event::Close).count();
        assert_eq!(connects, 3);
        assert_eq!(closes, 3);
        assert_eq!(events.last(), Some(&Event::Close));
    }

    #[tokio::test]
    async fn test_custom_budget() {
        let backend = FakeBackend::failing_connects(usize::MAX);
        let transport = DirectTransport::with_max_attempts(backend.clone(), ADDR, 3);
        assert!(transport.write(CONTROL_HANDLE, &[0x04]).await.is_err());
        assert_eq!(backend.connect_attempts(), 3);
    }
}
