//! Color conversion for the light entity.
//!
//! Everything is computed in `f64`. Channels are truncated, so single
//! precision would move values across integer boundaries.

/// Converts HSV to RGB.
///
/// # Arguments
///
/// * `hue` - Hue in degrees (0-360)
/// * `saturation` - Saturation in percent (0-100)
/// * `value` - Value in percent (0-100)
///
/// Channels are scaled to 0-255 and truncated.
pub fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    let h = hue / 360.0;
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let v = (value / 100.0).clamp(0.0, 1.0);

    let (r, g, b) = if s == 0.0 {
        (v, v, v)
    } else {
        let sector = (h * 6.0).trunc();
        let f = h * 6.0 - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        match (sector as i64).rem_euclid(6) {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        }
    };

    (to_channel(r), to_channel(g), to_channel(b))
}

fn to_channel(x: f64) -> u8 {
    (x * 255.0) as u8
}

/// Converts RGB channels to hue in degrees, saturation and value in
/// percent, each rounded to three decimals
pub fn rgb_to_hsv(red: u8, green: u8, blue: u8) -> (f64, f64, f64) {
    let r = f64::from(red) / 255.0;
    let g = f64::from(green) / 255.0;
    let b = f64::from(blue) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return (0.0, 0.0, round3(max * 100.0));
    }

    let range = max - min;
    let rc = (max - r) / range;
    let gc = (max - g) / range;
    let bc = (max - b) / range;
    let h = if r == max {
        bc - gc
    } else if g == max {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };

    (
        round3((h / 6.0).rem_euclid(1.0) * 360.0),
        round3(range / max * 100.0),
        round3(max * 100.0),
    )
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Scales a 0-255 brightness to the 0-100 value [`hsv_to_rgb`] expects
pub fn brightness_to_value(brightness: u8) -> f64 {
    f64::from(brightness) * 100.0 / 255.0
}
