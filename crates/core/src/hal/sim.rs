//! In-memory hardware implementations.
//!
//! These stand in for the real bindings during tests and in the simulate
//! mode of the application. They record every interaction so tests can
//! assert on bus state, painted frames and playback requests without any
//! hardware attached.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use super::{AudioOutput, DeviceStack, LedStrip, MultiplexerBus, RangingDriver, Rgb};

/// Simulated I2C bus holding one mask register per present multiplexer.
#[derive(Debug, Default)]
pub struct SimBus {
    present: Vec<u8>,
    masks: HashMap<u8, u8>,
    rejected: HashSet<u8>,
    writes: Vec<(u8, u8)>,
}

impl SimBus {
    /// Creates a bus with chips present at the given addresses.
    pub fn new(present: &[u8]) -> Self {
        Self {
            present: present.to_vec(),
            ..Self::default()
        }
    }

    /// Makes every future mask write to `address` fail.
    pub fn reject_writes(&mut self, address: u8) {
        self.rejected.insert(address);
    }

    /// Number of enabled channel bits across every chip on the bus.
    pub fn enabled_bits(&self) -> u32 {
        self.masks.values().map(|mask| mask.count_ones()).sum()
    }

    /// Current mask register of the chip at `address`.
    pub fn mask(&self, address: u8) -> u8 {
        self.masks.get(&address).copied().unwrap_or(0)
    }

    /// Every mask write seen so far, in order.
    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }
}

impl MultiplexerBus for SimBus {
    fn probe_presence(&mut self, address: u8) -> bool {
        self.present.contains(&address)
    }

    fn write_channel_mask(&mut self, address: u8, mask: u8) -> bool {
        if !self.present.contains(&address) || self.rejected.contains(&address) {
            return false;
        }
        self.masks.insert(address, mask);
        self.writes.push((address, mask));
        true
    }
}

/// Scripted ranging driver.
///
/// Channels can carry a queue of one-shot readings followed by an optional
/// steady value; anything else reads as `None`. Initialization succeeds for
/// every channel marked fitted.
#[derive(Debug, Default)]
pub struct SimRanging {
    fitted: HashSet<usize>,
    scripted: HashMap<usize, VecDeque<Option<u16>>>,
    steady: HashMap<usize, u16>,
    budgets: HashMap<usize, u32>,
}

impl SimRanging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `channel` as having a sensor that initializes successfully.
    pub fn fit(&mut self, channel: usize) -> &mut Self {
        self.fitted.insert(channel);
        self
    }

    /// Marks `channel` fitted and always reading `mm`.
    pub fn fit_steady(&mut self, channel: usize, mm: u16) -> &mut Self {
        self.fit(channel);
        self.steady.insert(channel, mm);
        self
    }

    /// Queues a one-shot reading for `channel`, consumed before the steady
    /// value. `None` simulates a failed read.
    pub fn push_reading(&mut self, channel: usize, reading: Option<u16>) -> &mut Self {
        self.scripted.entry(channel).or_default().push_back(reading);
        self
    }

    /// Timing budget applied at the last bring-up of `channel`, if any.
    pub fn budget(&self, channel: usize) -> Option<u32> {
        self.budgets.get(&channel).copied()
    }
}

impl RangingDriver for SimRanging {
    fn initialize(&mut self, channel: usize, timing_budget_us: u32) -> bool {
        if !self.fitted.contains(&channel) {
            return false;
        }
        self.budgets.insert(channel, timing_budget_us);
        true
    }

    fn read_distance_mm(&mut self, channel: usize) -> Option<u16> {
        if let Some(queue) = self.scripted.get_mut(&channel) {
            if let Some(front) = queue.pop_front() {
                return front;
            }
        }
        self.steady.get(&channel).copied()
    }
}

/// LED strip backed by a plain frame buffer.
#[derive(Debug)]
pub struct SimStrip {
    pixels: Vec<Rgb>,
    shows: usize,
}

impl SimStrip {
    pub fn new(pixel_count: usize) -> Self {
        Self {
            pixels: vec![Rgb::BLACK; pixel_count],
            shows: 0,
        }
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// How many times the buffer was flushed.
    pub fn show_count(&self) -> usize {
        self.shows
    }
}

impl LedStrip for SimStrip {
    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn show(&mut self) {
        self.shows += 1;
    }

    fn pixel_count(&self) -> usize {
        self.pixels.len()
    }
}

/// Scriptable output device stack.
#[derive(Debug, Default)]
pub struct SimDeviceStack {
    devices: Vec<(String, String)>,
    connected: HashSet<String>,
    connect_results: VecDeque<bool>,
    powered: bool,
    connect_calls: u32,
}

impl SimDeviceStack {
    /// Creates a stack reporting the given `(name, address)` pairs.
    pub fn new(devices: &[(&str, &str)]) -> Self {
        Self {
            devices: devices
                .iter()
                .map(|(name, addr)| (name.to_string(), addr.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    /// Queues the outcome of the next `connect` call; once the queue is
    /// drained every connect succeeds.
    pub fn push_connect_result(&mut self, ok: bool) -> &mut Self {
        self.connect_results.push_back(ok);
        self
    }

    /// Marks `address` as already connected.
    pub fn preconnect(&mut self, address: &str) -> &mut Self {
        self.connected.insert(address.to_string());
        self
    }

    pub fn powered(&self) -> bool {
        self.powered
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls
    }
}

impl DeviceStack for SimDeviceStack {
    fn list_devices(&mut self) -> Vec<(String, String)> {
        self.devices.clone()
    }

    fn query_connected(&mut self, address: &str) -> bool {
        self.connected.contains(address)
    }

    fn power_on(&mut self) {
        self.powered = true;
    }

    fn connect(&mut self, address: &str) -> bool {
        self.connect_calls += 1;
        let ok = self.connect_results.pop_front().unwrap_or(true);
        if ok {
            self.connected.insert(address.to_string());
        }
        ok
    }
}

/// Audio output that records every request.
#[derive(Debug, Default)]
pub struct SimAudio {
    play_results: VecDeque<bool>,
    played: Vec<(u8, PathBuf)>,
    stopped: Vec<u8>,
}

impl SimAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next `play_on_channel` call; once drained
    /// every play succeeds.
    pub fn push_play_result(&mut self, ok: bool) -> &mut Self {
        self.play_results.push_back(ok);
        self
    }

    /// Every accepted play request as `(channel, sound)`.
    pub fn played(&self) -> &[(u8, PathBuf)] {
        &self.played
    }

    pub fn stopped(&self) -> &[u8] {
        &self.stopped
    }
}

impl AudioOutput for SimAudio {
    fn play_on_channel(&mut self, channel: u8, sound: &Path) -> bool {
        let ok = self.play_results.pop_front().unwrap_or(true);
        if ok {
            self.played.push((channel, sound.to_path_buf()));
        }
        ok
    }

    fn stop_channel(&mut self, channel: u8) {
        self.stopped.push(channel);
    }
}
