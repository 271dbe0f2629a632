//! Library-level BLE access: open a connection to one address, write a
//! handle, close it again.

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument, trace};
use uuid::Uuid;

use crate::encoding::CONTROL_HANDLE;
use crate::{Error, Result};

/// Something that can open connections to a BLE device by address
pub trait BleBackend: Send + Sync {
    fn connect<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Box<dyn BleConnection>>>;
}

/// An open connection. Callers must [`close`](BleConnection::close) it on
/// every path; [`with_connection`] does that for them.
pub trait BleConnection: Send {
    fn write_handle<'a>(&'a mut self, handle: u16, data: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Connects, writes `data` if there is any, and closes the connection.
///
/// The connection is closed whether or not the write succeeded. A write
/// error wins over a close error.
pub async fn with_connection(
    backend: &dyn BleBackend,
    address: &str,
    handle: u16,
    data: Option<&[u8]>,
) -> Result<()> {
    let mut connection = backend.connect(address).await?;
    let written = match data {
        Some(data) => connection.write_handle(handle, data).await,
        None => Ok(()),
    };
    let closed = connection.close().await;
    written.and(closed)
}

/// Characteristic UUIDs of the handles these controllers expose
const HANDLE_MAP: &[(u16, Uuid)] = &[(
    CONTROL_HANDLE,
    Uuid::from_u128(0x0000ffe9_0000_1000_8000_00805f9b34fb),
)];

/// Looks up the characteristic UUID behind a handle
pub fn characteristic_for_handle(handle: u16) -> Result<Uuid> {
    HANDLE_MAP
        .iter()
        .find(|(h, _)| *h == handle)
        .map(|(_, uuid)| *uuid)
        .ok_or(Error::UnknownHandle(handle))
}

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapters = manager.adapters().await?;
    match adapters.into_iter().next() {
        Some(adapter) => Ok(adapter),
        None => {
            error!("No Bluetooth adapters found");
            Err(Error::NoBluetoothAdapters)
        }
    }
}

/// [`BleBackend`] on top of btleplug
#[derive(Clone)]
pub struct BtleplugBackend {
    central: Adapter,
    discovery_timeout: Duration,
}

impl BtleplugBackend {
    /// Uses the first Bluetooth adapter of the system
    #[instrument]
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let central = get_central(&manager).await?;
        Ok(BtleplugBackend {
            central,
            discovery_timeout: Duration::from_secs(10),
        })
    }

    /// Finds the peripheral with a matching address or id, scanning if it is
    /// not known to the adapter yet
    #[instrument(skip(self))]
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        if let Some(p) = self.known_peripheral(address).await? {
            return Ok(p);
        }

        info!("Scanning for {}...", address);
        self.central.start_scan(ScanFilter::default()).await?;

        let start_time = std::time::Instant::now();
        while start_time.elapsed() < self.discovery_timeout {
            if let Some(p) = self.known_peripheral(address).await? {
                self.central.stop_scan().await?;
                return Ok(p);
            }
            trace!("{} not seen yet", address);
            time::sleep(Duration::from_millis(500)).await;
        }

        self.central.stop_scan().await?;
        error!(
            "Device {} not found within {} seconds",
            address,
            self.discovery_timeout.as_secs()
        );
        Err(Error::DeviceNotFound(address.to_string()))
    }

    async fn known_peripheral(&self, address: &str) -> Result<Option<Peripheral>> {
        let wanted = address.to_lowercase();
        let peripherals = self.central.peripherals().await?;
        Ok(peripherals.into_iter().find(|p| {
            p.address().to_string().to_lowercase() == wanted
                || p.id().to_string().to_lowercase() == wanted
        }))
    }

    #[instrument(skip(self))]
    async fn open(&self, address: &str) -> Result<BtleplugConnection> {
        let peripheral = self.find_peripheral(address).await?;
        if !peripheral.is_connected().await? {
            debug!("Connecting to {}", address);
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;
        Ok(BtleplugConnection { peripheral })
    }
}

impl BleBackend for BtleplugBackend {
    fn connect<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Box<dyn BleConnection>>> {
        Box::pin(async move {
            let connection = self.open(address).await?;
            Ok(Box::new(connection) as Box<dyn BleConnection>)
        })
    }
}

struct BtleplugConnection {
    peripheral: Peripheral,
}

impl BtleplugConnection {
    fn characteristic(&self, handle: u16) -> Result<Characteristic> {
        let uuid = characteristic_for_handle(handle)?;
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(Error::CharacteristicNotFound(uuid.to_string()))
    }
}

impl BleConnection for BtleplugConnection {
    fn write_handle<'a>(&'a mut self, handle: u16, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let characteristic = self.characteristic(handle)?;
            trace!("Writing {} bytes to {}", data.len(), characteristic.uuid);
            self.peripheral
                .write(&characteristic, data, WriteType::WithResponse)
                .await
                .map_err(|e| Error::BleError(e.to_string()))
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            self.peripheral.disconnect().await?;
            Ok(())
        })
    }
}
