use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, StairlightError};

/// Top-level configuration for one installation run.
///
/// Every tunable the control loop consumes is loaded here and handed to the
/// relevant component at construction; nothing reads configuration globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationConfig {
    pub distance: DistanceConfig,
    pub bus: BusConfig,
    pub lighting: LightingConfig,
    pub audio: AudioConfig,
    pub stairs: Vec<StairConfig>,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            distance: DistanceConfig::default(),
            bus: BusConfig::default(),
            lighting: LightingConfig::default(),
            audio: AudioConfig::default(),
            stairs: StairConfig::default_flight(),
        }
    }
}

impl InstallationConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the internal consistency rules that do not depend on hardware.
    ///
    /// The remaining rule, that per-stair LED counts sum to the strip length,
    /// is checked when the stair layout is built against a concrete strip.
    pub fn validate(&self) -> Result<()> {
        if self.bus.multiplexer_addresses.is_empty() {
            return Err(StairlightError::config(
                "at least one multiplexer address is required",
            ));
        }
        if self.distance.min_mm >= self.distance.max_mm {
            return Err(StairlightError::config(
                "minimum distance must be below maximum distance",
            ));
        }
        if self.stairs.is_empty() {
            return Err(StairlightError::config("at least one stair is required"));
        }

        let max_channels = self.bus.multiplexer_addresses.len() * 8;
        let mut seen = Vec::new();
        for stair in &self.stairs {
            if stair.led_count == 0 {
                return Err(StairlightError::config(format!(
                    "stair {} has no LEDs",
                    stair.number
                )));
            }
            if let Some(channel) = stair.channel {
                if channel >= max_channels {
                    return Err(StairlightError::config(format!(
                        "stair {} maps channel {channel}, but only {max_channels} channels exist",
                        stair.number
                    )));
                }
                if seen.contains(&channel) {
                    return Err(StairlightError::config(format!(
                        "channel {channel} is mapped to more than one stair"
                    )));
                }
                seen.push(channel);
            }
        }
        Ok(())
    }
}

/// Distance thresholds, all in millimeters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceConfig {
    /// Distance at which the colour mapping saturates to full intensity.
    pub min_mm: f32,
    /// Distance at which the colour mapping bottoms out.
    pub max_mm: f32,
    /// A reading strictly below this counts as a trigger.
    pub trigger_mm: f32,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            min_mm: 200.0,
            max_mm: 2000.0,
            // 27 inches
            trigger_mm: 685.8,
        }
    }
}

/// Shared-bus and polling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Addresses of the cascaded multiplexer chips, in channel order.
    pub multiplexer_addresses: Vec<u8>,
    /// Wait after enabling a channel before the downstream sensor is usable.
    pub settle_ms: u64,
    /// Fixed cadence of the poll loop; one channel is read per tick.
    pub poll_interval_ms: u64,
    /// Backoff between discovery passes while no sensor is active.
    pub discovery_retry_ms: u64,
    /// Measurement timing budget pushed to every sensor at bring-up.
    pub timing_budget_us: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            multiplexer_addresses: vec![0x70, 0x71],
            settle_ms: 100,
            poll_interval_ms: 20,
            discovery_retry_ms: 5_000,
            timing_budget_us: 33_000,
        }
    }
}

impl BusConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn discovery_retry(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_ms)
    }
}

/// How readings and trigger edges are turned into light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingMode {
    /// Paint every stair segment with the colour of the newest reading.
    ContinuousWholeStrip,
    /// Paint only the segment mapped to the channel that produced a reading.
    ContinuousPerStair,
    /// Leave segments dark until a trigger edge, then ramp brightness.
    RampOnTrigger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightingConfig {
    pub mode: LightingMode,
    /// Number of brightness steps per ramp.
    pub ramp_steps: u32,
    /// Pause between ramp steps; the ramp blocks the tick that started it.
    pub ramp_step_delay_ms: u64,
    /// Run the red/green/blue strip wipe before the loop starts.
    pub self_test: bool,
    /// How long each self-test colour is held.
    pub self_test_hold_ms: u64,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            mode: LightingMode::RampOnTrigger,
            ramp_steps: 10,
            ramp_step_delay_ms: 20,
            self_test: true,
            self_test_hold_ms: 1_000,
        }
    }
}

impl LightingConfig {
    pub fn ramp_step_delay(&self) -> Duration {
        Duration::from_millis(self.ramp_step_delay_ms)
    }

    pub fn self_test_hold(&self) -> Duration {
        Duration::from_millis(self.self_test_hold_ms)
    }
}

/// Output device and trigger-sound parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Substring matched against the names reported by the device stack.
    pub device_name: String,
    /// Minimum time between two sound triggers for the same stair.
    pub cooldown_ms: u64,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_name: "JBL GO 2+".to_string(),
            cooldown_ms: 2_000,
            connect_attempts: 3,
            connect_backoff_ms: 2_000,
        }
    }
}

impl AudioConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

/// One physical stair: its share of the strip, its sensor, its sound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StairConfig {
    pub number: u32,
    /// Global sensor channel watching this stair, if one is fitted.
    pub channel: Option<usize>,
    /// LED count for this stair; stairs may be unequal.
    pub led_count: usize,
    /// Sound played on a rising trigger edge.
    pub sound: Option<PathBuf>,
}

impl StairConfig {
    /// The as-built flight: ten stairs of thirty LEDs, one sensor each,
    /// sharing a single trigger sound.
    pub fn default_flight() -> Vec<Self> {
        (0..10)
            .map(|i| Self {
                number: i + 1,
                channel: Some(i as usize),
                led_count: 30,
                sound: Some(PathBuf::from("stair_trigger.wav")),
            })
            .collect()
    }
}
