/*!
 # RGBW light entity

 Tracks on/off, brightness, hue/saturation and white level for one
 controller and turns requested changes into [`Interactor`] calls.

 The state is optimistic: it mirrors the last commands sent and is never
 read back from the device, so it can drift from what the light shows when
 writes fail without an error.
*/

use tracing::{debug, info, instrument};

use crate::color::{brightness_to_value, hsv_to_rgb, rgb_to_hsv};
use crate::interactor::Interactor;
use crate::Result;

/// Feature bit: brightness control
pub const SUPPORT_BRIGHTNESS: u32 = 1;
/// Feature bit: color control
pub const SUPPORT_COLOR: u32 = 16;
/// Feature bit: white value control
pub const SUPPORT_WHITE_VALUE: u32 = 128;

/// Optional attributes of a turn-on request
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnOn {
    /// Brightness (0-255)
    pub brightness: Option<u8>,
    /// Hue (0-360) and saturation (0-100)
    pub hs_color: Option<(f64, f64)>,
    /// White level (0-255)
    pub white_value: Option<u8>,
}

impl TurnOn {
    pub fn brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn hs_color(mut self, hue: f64, saturation: f64) -> Self {
        self.hs_color = Some((hue, saturation));
        self
    }

    pub fn white_value(mut self, white_value: u8) -> Self {
        self.white_value = Some(white_value);
        self
    }
}

/// A light entity backed by one [`Interactor`]
pub struct RgbwLight {
    name: String,
    interactor: Interactor,
    is_on: bool,
    brightness: u8,
    hs_color: (f64, f64),
    white_value: u8,
}

impl RgbwLight {
    pub fn new(name: impl Into<String>, interactor: Interactor) -> Self {
        RgbwLight {
            name: name.into(),
            interactor,
            is_on: false,
            brightness: 255,
            hs_color: (0.0, 0.0),
            white_value: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        self.interactor.address()
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn hs_color(&self) -> (f64, f64) {
        self.hs_color
    }

    pub fn white_value(&self) -> u8 {
        self.white_value
    }

    pub fn supported_features(&self) -> u32 {
        SUPPORT_BRIGHTNESS | SUPPORT_COLOR | SUPPORT_WHITE_VALUE
    }

    /// Turns the light on and applies the requested attributes.
    ///
    /// Brightness and hue/saturation are sent together as one RGB command;
    /// the white level is sent separately. Attribute state is stored before
    /// the write.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn turn_on(&mut self, request: TurnOn) -> Result<()> {
        if !self.is_on {
            self.interactor.set_on().await?;
            self.is_on = true;
        }

        if request.brightness.is_some() || request.hs_color.is_some() {
            self.brightness = request.brightness.unwrap_or(self.brightness);
            self.hs_color = request.hs_color.unwrap_or(self.hs_color);
            let (hue, saturation) = self.hs_color;
            let (r, g, b) = hsv_to_rgb(hue, saturation, brightness_to_value(self.brightness));
            info!("Sending RGB value ({}, {}, {})", r, g, b);
            self.interactor.set_color(r, g, b).await?;
        }

        if let Some(white_value) = request.white_value {
            self.white_value = white_value;
            info!("Sending white value {}", white_value);
            self.interactor.set_white(white_value).await?;
        }

        Ok(())
    }

    /// Turns the light on and sends raw RGB channels.
    ///
    /// The stored hue/saturation and brightness are derived from the
    /// channels before the write, brightness being the largest channel.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn set_rgb(&mut self, red: u8, green: u8, blue: u8) -> Result<()> {
        if !self.is_on {
            self.interactor.set_on().await?;
            self.is_on = true;
        }

        let (hue, saturation, _) = rgb_to_hsv(red, green, blue);
        self.hs_color = (hue, saturation);
        self.brightness = red.max(green).max(blue);
        info!("Sending RGB value ({}, {}, {})", red, green, blue);
        self.interactor.set_color(red, green, blue).await
    }

    /// Turns the light off if it is on
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn turn_off(&mut self) -> Result<()> {
        if self.is_on {
            self.interactor.set_off().await?;
            self.is_on = false;
        }
        Ok(())
    }

    /// No-op: the device offers no state to read back
    pub fn update(&mut self) {
        debug!("{} keeps its assumed state", self.name);
    }

    /// Releases the interactor, waiting for queued writes
    pub async fn close(self) -> Result<()> {
        self.interactor.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::fake::FakeBackend;
    use crate::direct::DirectTransport;
    use crate::encoding::{encode_color, encode_power, encode_white, CONTROL_HANDLE};
    use std::sync::Arc;

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    fn light(backend: Arc<FakeBackend>) -> RgbwLight {
        let transport = DirectTransport::new(backend, ADDR);
        RgbwLight::new("Desk", Interactor::new(ADDR, Box::new(transport)))
    }

    fn payloads(backend: &FakeBackend) -> Vec<Vec<u8>> {
        backend
            .writes()
            .into_iter()
            .map(|(handle, data)| {
                assert_eq!(handle, CONTROL_HANDLE);
                data
            })
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let light = light(FakeBackend::new());
        assert_eq!(light.name(), "Desk");
        assert_eq!(light.address(), ADDR);
        assert!(!light.is_on());
        assert_eq!(light.brightness(), 255);
        assert_eq!(light.hs_color(), (0.0, 0.0));
        assert_eq!(light.white_value(), 0);
        assert_eq!(light.supported_features(), 1 | 16 | 128);
    }

    #[tokio::test]
    async fn test_turn_on_only_powers_once() {
        let backend = FakeBackend::new();
        let mut light = light(backend.clone());

        light.turn_on(TurnOn::default()).await.unwrap();
        light.turn_on(TurnOn::default()).await.unwrap();

        assert!(light.is_on());
        assert_eq!(payloads(&backend), vec![encode_power(true).into_bytes()]);
    }

    #[tokio::test]
    async fn test_turn_on_with_color() {
        let backend = FakeBackend::new();
        let mut light = light(backend.clone());

        light
            .turn_on(TurnOn::default().hs_color(0.0, 100.0))
            .await
            .unwrap();

        assert_eq!(light.hs_color(), (0.0, 100.0));
        assert_eq!(
            payloads(&backend),
            vec![
                encode_power(true).into_bytes(),
                encode_color(255, 0, 0).into_bytes(),
            ]
        );
    }

    #[tokio::test]
    async fn test_brightness_reuses_stored_color() {
        let backend = FakeBackend::new();
        let mut light = light(backend.clone());

        light
            .turn_on(TurnOn::default().hs_color(120.0, 100.0))
            .await
            .unwrap();
        light.turn_on(TurnOn::default().brightness(0)).await.unwrap();

        assert_eq!(light.brightness(), 0);
        assert_eq!(light.hs_color(), (120.0, 100.0));
        assert_eq!(
            payloads(&backend).last(),
            Some(&encode_color(0, 0, 0).into_bytes())
        );
    }

    #[tokio::test]
    async fn test_brightness_uses_double_precision() {
        let backend = FakeBackend::new();
        let mut light = light(backend.clone());

        light
            .turn_on(TurnOn::default().hs_color(100.0, 75.0).brightness(2))
            .await
            .unwrap();

        assert_eq!(
            payloads(&backend).last(),
            Some(&encode_color(1, 2, 0).into_bytes())
        );
    }

    #[tokio::test]
    async fn test_set_rgb_updates_state() {
        let backend = FakeBackend::new();
        let mut light = light(backend.clone());

        light.set_rgb(10, 20, 30).await.unwrap();

        assert!(light.is_on());
        assert_eq!(light.brightness(), 30);
        assert_eq!(light.hs_color(), (210.0, 66.667));
        assert_eq!(
            payloads(&backend),
            vec![
                encode_power(true).into_bytes(),
                encode_color(10, 20, 30).into_bytes(),
            ]
        );

        // A later brightness change keeps the derived color
        light.turn_on(TurnOn::default().brightness(255)).await.unwrap();
        assert_eq!(light.hs_color(), (210.0, 66.667));
    }

    #[tokio::test]
    async fn test_white_value() {
        let backend = FakeBackend::new();
        let mut light = light(backend.clone());

        light.turn_on(TurnOn::default().white_value(90)).await.unwrap();

        assert_eq!(light.white_value(), 90);
        assert_eq!(
            payloads(&backend),
            vec![encode_power(true).into_bytes(), encode_white(90).into_bytes()]
        );
    }

    #[tokio::test]
    async fn test_turn_off() {
        let backend = FakeBackend::new();
        let mut light = light(backend.clone());

        light.turn_off().await.unwrap();
        assert!(payloads(&backend).is_empty());

        light.turn_on(TurnOn::default()).await.unwrap();
        light.turn_off().await.unwrap();
        assert!(!light.is_on());
        assert_eq!(
            payloads(&backend),
            vec![encode_power(true).into_bytes(), encode_power(false).into_bytes()]
        );
    }

    #[tokio::test]
    async fn test_failed_power_keeps_state() {
        let backend = FakeBackend::failing_connects(usize::MAX);
        let mut light = light(backend);

        assert!(light.turn_on(TurnOn::default()).await.is_err());
        assert!(!light.is_on());
    }

    #[tokio::test]
    async fn test_color_state_is_optimistic() {
        // Power succeeds, then every connection fails
        let backend = FakeBackend::new();
        let mut light = light(backend.clone());
        light.turn_on(TurnOn::default()).await.unwrap();

        let failing = FakeBackend::failing_connects(usize::MAX);
        light.interactor = Interactor::new(
            ADDR,
            Box::new(DirectTransport::new(failing, ADDR)),
        );

        assert!(light
            .turn_on(TurnOn::default().brightness(10).white_value(5))
            .await
            .is_err());
        assert_eq!(light.brightness(), 10);
        assert_eq!(light.white_value(), 0);
    }
}
