/*!
 # Bluetooth LE RGBW Light Controller Library

 A Rust library for driving Bluetooth LE RGBW light controllers whose control
 characteristic lives at GATT handle `0x0007` (the "LEDBlue"/Triones family).

 ## Features

 * Power on/off control
 * RGB color control
 * White channel control
 * Three interchangeable transports:
   * `gatttool` subprocess with retries
   * direct BLE connection with a capped number of attempts
   * keep-alive worker that keeps the controller's radio responsive
 * An entity with optimistic on/off, brightness, hue/saturation and white state

 ## Example

 ```no_run
 use ble_rgbw_light::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let config = LightConfig::new("AA:BB:CC:DD:EE:FF", "Desk");
     let interactor = Interactor::from_config(&config).await?;
     let mut light = RgbwLight::new(config.name.clone(), interactor);

     light.turn_on(TurnOn::default().hs_color(0.0, 100.0)).await?; // Red
     light.turn_on(TurnOn::default().white_value(128)).await?;
     light.turn_off().await?;

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the RGBW light controller library
#[derive(Error, Debug)]
pub enum Error {
    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// The configured device did not show up while scanning
    #[error("Device {0} not found")]
    DeviceNotFound(String),

    /// No characteristic is known for the requested handle
    #[error("No characteristic known for handle {0:#06x}")]
    UnknownHandle(u16),

    /// Failed to find required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(String),

    /// BLE communication error
    #[error("BLE communication error: {0}")]
    BleError(String),

    /// The keep-alive worker is gone and can no longer take commands
    #[error("Keep-alive worker for {0} has stopped")]
    WorkerStopped(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error(transparent)]
    ConfigParse(#[from] toml::de::Error),

    /// Error from btleplug
    #[error(transparent)]
    BtlePlugError(#[from] btleplug::Error),

    /// I/O error, typically while spawning a process
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod ble;
pub mod color;
pub mod config;
pub mod direct;
pub mod encoding;
pub mod gatttool;
pub mod interactor;
pub mod keepalive;
pub mod light;
pub mod transport;

// Re-export key types
pub use ble::{BleBackend, BleConnection, BtleplugBackend};
pub use config::{Backend, LightConfig};
pub use direct::DirectTransport;
pub use encoding::{encode_color, encode_power, encode_white, Payload, CONTROL_HANDLE};
pub use gatttool::GattToolTransport;
pub use interactor::Interactor;
pub use keepalive::{KeepAliveHandle, KeepAliveTransport};
pub use light::{RgbwLight, TurnOn};
pub use transport::Transport;
