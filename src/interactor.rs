use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::ble::{BleBackend, BtleplugBackend};
use crate::config::{Backend, LightConfig};
use crate::direct::DirectTransport;
use crate::encoding::{encode_color, encode_power, encode_white, Payload, CONTROL_HANDLE};
use crate::gatttool::{GattToolTransport, ProcessRunner};
use crate::keepalive::KeepAliveTransport;
use crate::transport::Transport;
use crate::Result;

/// Command surface for one light controller.
///
/// Every verb encodes its command and writes it to [`CONTROL_HANDLE`]
/// through the transport chosen at construction time. Whether a failed
/// write surfaces as an error depends on that transport: only
/// [`DirectTransport`] returns one.
pub struct Interactor {
    address: String,
    transport: Box<dyn Transport>,
}

impl Interactor {
    pub fn new(address: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Interactor {
            address: address.into(),
            transport,
        }
    }

    /// Builds the transport named by `config.backend`.
    ///
    /// Library backends open the system's Bluetooth adapter here; the
    /// keep-alive backend also starts its worker, so this must run inside a
    /// tokio runtime.
    #[instrument(skip(config), fields(address = %config.address, backend = ?config.backend))]
    pub async fn from_config(config: &LightConfig) -> Result<Self> {
        config.validate()?;
        let address = config.address.clone();

        let transport: Box<dyn Transport> = match config.backend {
            Backend::Gatttool => Box::new(GattToolTransport::with_runner(
                address.clone(),
                config.gatttool.clone(),
                ProcessRunner,
            )),
            Backend::Direct => {
                let backend: Arc<dyn BleBackend> = Arc::new(BtleplugBackend::new().await?);
                Box::new(DirectTransport::with_max_attempts(
                    backend,
                    address.clone(),
                    config.max_attempts_or(crate::direct::DEFAULT_MAX_ATTEMPTS),
                ))
            }
            Backend::KeepAlive => {
                let backend: Arc<dyn BleBackend> = Arc::new(BtleplugBackend::new().await?);
                Box::new(KeepAliveTransport::with_settings(
                    backend,
                    address.clone(),
                    Duration::from_secs(config.keepalive_interval_secs),
                    config.max_attempts_or(crate::keepalive::DEFAULT_MAX_ATTEMPTS),
                ))
            }
        };

        info!("Using {} transport for {}", transport.kind(), address);
        Ok(Self::new(address, transport))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    /// Turns the light on
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn set_on(&self) -> Result<()> {
        self.send(encode_power(true)).await
    }

    /// Turns the light off
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn set_off(&self) -> Result<()> {
        self.send(encode_power(false)).await
    }

    /// Sets the RGB channels
    ///
    /// # Arguments
    ///
    /// * `red` - Red component (0-255)
    /// * `green` - Green component (0-255)
    /// * `blue` - Blue component (0-255)
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn set_color(&self, red: u8, green: u8, blue: u8) -> Result<()> {
        self.send(encode_color(red, green, blue)).await
    }

    /// Sets the white channel (0-255)
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn set_white(&self, level: u8) -> Result<()> {
        self.send(encode_white(level)).await
    }

    /// Waits for queued writes and releases the transport
    pub async fn close(self) -> Result<()> {
        debug!("Closing {} transport for {}", self.transport.kind(), self.address);
        self.transport.close().await
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        debug!("Sending value {}", payload);
        self.transport
            .write(CONTROL_HANDLE, payload.as_bytes())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::fake::{Event, FakeBackend};
    use crate::Error;

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    fn direct(backend: Arc<FakeBackend>) -> Interactor {
        Interactor::new(ADDR, Box::new(DirectTransport::new(backend, ADDR)))
    }

    #[tokio::test]
    async fn test_set_color_end_to_end() {
        let backend = FakeBackend::new();
        let interactor = direct(backend.clone());

        interactor.set_color(255, 0, 128).await.unwrap();

        assert_eq!(backend.connect_attempts(), 1);
        assert_eq!(
            backend.writes(),
            vec![(CONTROL_HANDLE, encode_color(255, 0, 128).into_bytes())]
        );
        assert_eq!(
            backend.events(),
            vec![
                Event::Connect(ADDR.to_string()),
                Event::Write(CONTROL_HANDLE, vec![0x56, 0xff, 0x00, 0x80, 0x00, 0xf0, 0xaa]),
                Event::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_verbs_encode_commands() {
        let backend = FakeBackend::new();
        let interactor = direct(backend.clone());

        interactor.set_on().await.unwrap();
        interactor.set_white(200).await.unwrap();
        interactor.set_off().await.unwrap();

        assert_eq!(
            backend.writes(),
            vec![
                (CONTROL_HANDLE, encode_power(true).into_bytes()),
                (CONTROL_HANDLE, encode_white(200).into_bytes()),
                (CONTROL_HANDLE, encode_power(false).into_bytes()),
            ]
        );
    }

    #[tokio::test]
    async fn test_direct_failure_propagates() {
        let backend = FakeBackend::failing_connects(usize::MAX);
        let interactor = direct(backend);
        assert!(matches!(
            interactor.set_on().await,
            Err(Error::BleError(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_keepalive_queue() {
        let backend = FakeBackend::new();
        let transport = KeepAliveTransport::spawn(backend.clone(), ADDR);
        let interactor = Interactor::new(ADDR, Box::new(transport));

        interactor.set_on().await.unwrap();
        interactor.set_color(1, 2, 3).await.unwrap();
        interactor.close().await.unwrap();

        assert_eq!(
            backend.writes(),
            vec![
                (CONTROL_HANDLE, encode_power(true).into_bytes()),
                (CONTROL_HANDLE, encode_color(1, 2, 3).into_bytes()),
            ]
        );
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid() {
        let config = LightConfig::new("", "Desk");
        assert!(matches!(
            Interactor::from_config(&config).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_gatttool() {
        let mut config = LightConfig::new(ADDR, "Desk");
        config.backend = Backend::Gatttool;
        let interactor = Interactor::from_config(&config).await.unwrap();
        assert_eq!(interactor.transport_kind(), "gatttool");
        assert_eq!(interactor.address(), ADDR);
    }
}
