//! Hardware capability traits consumed by the core.
//!
//! The installation talks to all of its hardware through these narrow seams:
//! register-level sensor and multiplexer protocols, LED signal generation and
//! the audio stack live behind them. Faults are reported as values (`bool`,
//! `Option`), never by unwinding, so the control loop can degrade instead of
//! aborting. The [`sim`] module provides in-memory implementations used by
//! tests and the simulate mode.

use std::path::Path;

pub mod sim;

/// A colour as sent to the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scales the colour by `level`, where 255 leaves it unchanged and 0
    /// yields black.
    pub fn scaled(self, level: u8) -> Self {
        let scale = |c: u8| ((u16::from(c) * (u16::from(level) + 1)) >> 8) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }
}

/// Raw access to the multiplexer chips on the shared I2C bus.
pub trait MultiplexerBus {
    /// Non-destructive presence check of a chip at `address`.
    fn probe_presence(&mut self, address: u8) -> bool;

    /// Writes the channel-enable mask register of the chip at `address`.
    /// One bit per downstream channel; zero disables all of them.
    fn write_channel_mask(&mut self, address: u8, mask: u8) -> bool;
}

/// Driver for the time-of-flight sensors behind the multiplexers.
///
/// Both calls assume the channel owning the sensor was selected on the bus
/// beforehand and the settle time has elapsed.
pub trait RangingDriver {
    /// Brings up the sensor on `channel` and applies the timing budget.
    fn initialize(&mut self, channel: usize, timing_budget_us: u32) -> bool;

    /// Reads one distance in millimeters. `None` means the read failed or
    /// produced an invalid measurement.
    fn read_distance_mm(&mut self, channel: usize) -> Option<u16>;
}

/// The addressable LED strip.
pub trait LedStrip {
    fn set_pixel(&mut self, index: usize, color: Rgb);

    /// Flushes the pixel buffer to the physical strip.
    fn show(&mut self);

    fn pixel_count(&self) -> usize;
}

/// The Bluetooth-style output device stack (pairing CLI, adapter power).
pub trait DeviceStack {
    /// Lists visible or paired devices as `(name, address)` pairs.
    fn list_devices(&mut self) -> Vec<(String, String)>;

    fn query_connected(&mut self, address: &str) -> bool;

    fn power_on(&mut self);

    fn connect(&mut self, address: &str) -> bool;
}

/// Playback on a fixed pool of independent logical channels.
pub trait AudioOutput {
    /// Starts `sound` on the given logical channel.
    fn play_on_channel(&mut self, channel: u8, sound: &Path) -> bool;

    /// Stops whatever is playing on the given logical channel.
    fn stop_channel(&mut self, channel: u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_by_full_level_keeps_the_colour() {
        let c = Rgb::new(255, 128, 7);
        assert_eq!(c.scaled(255), c);
    }

    #[test]
    fn scaling_by_zero_is_black() {
        assert_eq!(Rgb::WHITE.scaled(0), Rgb::BLACK);
    }

    #[test]
    fn scaling_is_monotonic_in_level() {
        let c = Rgb::new(200, 100, 50);
        let mut last = Rgb::BLACK;
        for level in (0..=255).step_by(17) {
            let scaled = c.scaled(level as u8);
            assert!(scaled.r >= last.r && scaled.g >= last.g && scaled.b >= last.b);
            last = scaled;
        }
    }
}
