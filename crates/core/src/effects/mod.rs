use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::AudioPlayer;
use crate::config::{InstallationConfig, LightingMode, StairConfig};
use crate::hal::{AudioOutput, DeviceStack, LedStrip, Rgb};
use crate::trigger::TriggerEdge;
use crate::{Result, StairlightError};

/// Size of the logical playback channel pool; stairs beyond it share.
pub const MAX_PLAYBACK_CHANNELS: usize = 14;

/// Linear distance-to-colour mapping: full red at the near clamp fading to
/// full blue at the far clamp, green held at zero.
#[derive(Debug, Clone, Copy)]
pub struct ColorMap {
    min_mm: f32,
    max_mm: f32,
}

impl ColorMap {
    pub fn new(min_mm: f32, max_mm: f32) -> Self {
        Self { min_mm, max_mm }
    }

    pub fn max_mm(&self) -> f32 {
        self.max_mm
    }

    /// Maps a distance to a colour. Monotonic and clamped: everything at or
    /// inside the near clamp is identical, likewise at the far clamp.
    pub fn color_for(&self, distance_mm: f32) -> Rgb {
        let clamped = distance_mm.clamp(self.min_mm, self.max_mm);
        let intensity = 1.0 - (clamped - self.min_mm) / (self.max_mm - self.min_mm);
        Rgb::new(
            (255.0 * intensity).round() as u8,
            0,
            (255.0 * (1.0 - intensity)).round() as u8,
        )
    }
}

/// One stair's runtime state: its strip segment, sensor, sound and the
/// cooldown timestamp gating its audio triggers.
#[derive(Debug, Clone)]
pub struct Stair {
    pub number: u32,
    /// First LED index of the segment.
    pub start: usize,
    /// Last LED index of the segment, inclusive.
    pub end: usize,
    pub channel: Option<usize>,
    pub sound: Option<PathBuf>,
    pub triggered: bool,
    brightness: u8,
    last_trigger: Option<Instant>,
}

/// Contiguous stair segments computed once at startup as a prefix sum over
/// the per-stair LED counts. Stairs may be unequal; the counts must cover
/// the strip exactly.
#[derive(Debug)]
pub struct StairLayout {
    stairs: Vec<Stair>,
}

impl StairLayout {
    pub fn from_config(configs: &[StairConfig], strip_len: usize) -> Result<Self> {
        let mut next = 0;
        let stairs = configs
            .iter()
            .map(|config| {
                let start = next;
                next += config.led_count;
                Stair {
                    number: config.number,
                    start,
                    end: next - 1,
                    channel: config.channel,
                    sound: config.sound.clone(),
                    triggered: false,
                    brightness: 0,
                    last_trigger: None,
                }
            })
            .collect();

        if next != strip_len {
            return Err(StairlightError::config(format!(
                "stair LED counts total {next}, strip has {strip_len} pixels"
            )));
        }
        Ok(Self { stairs })
    }

    pub fn stairs(&self) -> &[Stair] {
        &self.stairs
    }

    pub fn stair_for_channel(&self, channel: usize) -> Option<usize> {
        self.stairs
            .iter()
            .position(|stair| stair.channel == Some(channel))
    }
}

/// Turns readings and trigger edges into LED and audio output.
///
/// Ramps run synchronously inside the dispatching call and block the tick
/// that started them; the resumable one-step-per-tick alternative was
/// considered and not adopted, to match the installed behaviour.
#[derive(Debug)]
pub struct EffectsDispatcher {
    layout: StairLayout,
    colors: ColorMap,
    mode: LightingMode,
    cooldown: Duration,
    ramp_steps: u32,
    ramp_step_delay: Duration,
}

impl EffectsDispatcher {
    pub fn new(config: &InstallationConfig, strip_len: usize) -> Result<Self> {
        Ok(Self {
            layout: StairLayout::from_config(&config.stairs, strip_len)?,
            colors: ColorMap::new(config.distance.min_mm, config.distance.max_mm),
            mode: config.lighting.mode,
            cooldown: config.audio.cooldown(),
            ramp_steps: config.lighting.ramp_steps.max(1),
            ramp_step_delay: config.lighting.ramp_step_delay(),
        })
    }

    pub fn layout(&self) -> &StairLayout {
        &self.layout
    }

    /// Paints the continuous colour for a fresh reading. In ramp mode light
    /// is driven purely by edges and this is a no-op.
    pub fn paint_reading<L: LedStrip>(&mut self, strip: &mut L, channel: usize, distance_mm: f32) {
        match self.mode {
            LightingMode::RampOnTrigger => {}
            LightingMode::ContinuousWholeStrip => {
                if distance_mm >= self.colors.max_mm {
                    self.blackout(strip);
                    return;
                }
                let color = self.colors.color_for(distance_mm);
                for index in 0..self.layout.stairs.len() {
                    self.paint_segment(strip, index, color);
                }
                strip.show();
            }
            LightingMode::ContinuousPerStair => {
                let Some(index) = self.layout.stair_for_channel(channel) else {
                    return;
                };
                let color = if distance_mm >= self.colors.max_mm {
                    Rgb::BLACK
                } else {
                    self.colors.color_for(distance_mm)
                };
                self.paint_segment(strip, index, color);
                strip.show();
            }
        }
    }

    /// Dispatches the effects for a trigger edge on `channel`.
    ///
    /// A rising edge ramps the stair's segment up (in ramp mode) and then
    /// requests its sound, gated by the per-stair cooldown; audio failures
    /// never block the light. A falling edge ramps symmetrically to dark.
    pub fn handle_edge<L, S, A>(
        &mut self,
        strip: &mut L,
        audio: &mut AudioPlayer<S, A>,
        channel: usize,
        edge: TriggerEdge,
        now: Instant,
    ) where
        L: LedStrip,
        S: DeviceStack,
        A: AudioOutput,
    {
        let Some(index) = self.layout.stair_for_channel(channel) else {
            return;
        };

        match edge {
            TriggerEdge::Rose => {
                self.layout.stairs[index].triggered = true;
                if self.mode == LightingMode::RampOnTrigger {
                    self.ramp(strip, index, u8::MAX);
                }
                self.dispatch_sound(audio, index, now);
            }
            TriggerEdge::Fell => {
                self.layout.stairs[index].triggered = false;
                if self.mode == LightingMode::RampOnTrigger {
                    self.ramp(strip, index, 0);
                }
            }
        }
    }

    /// Clears the stair state tied to an evicted channel.
    pub fn release_channel(&mut self, channel: usize) {
        if let Some(index) = self.layout.stair_for_channel(channel) {
            self.layout.stairs[index].triggered = false;
        }
    }

    /// Paints the whole strip dark and flushes. Also the guaranteed
    /// shutdown path, so it must stay dependency-free and synchronous.
    pub fn blackout<L: LedStrip>(&mut self, strip: &mut L) {
        for index in 0..strip.pixel_count() {
            strip.set_pixel(index, Rgb::BLACK);
        }
        strip.show();
        for stair in &mut self.layout.stairs {
            stair.brightness = 0;
        }
    }

    fn paint_segment<L: LedStrip>(&self, strip: &mut L, index: usize, color: Rgb) {
        let stair = &self.layout.stairs[index];
        for led in stair.start..=stair.end {
            strip.set_pixel(led, color);
        }
    }

    /// Steps the segment's brightness from its current level to `target`,
    /// repainting and flushing the sub-range at every step. Blocks for
    /// `ramp_steps * ramp_step_delay`.
    fn ramp<L: LedStrip>(&mut self, strip: &mut L, index: usize, target: u8) {
        let from = f32::from(self.layout.stairs[index].brightness);
        let to = f32::from(target);

        for step in 1..=self.ramp_steps {
            let fraction = step as f32 / self.ramp_steps as f32;
            let level = (from + (to - from) * fraction).round() as u8;
            self.paint_segment(strip, index, Rgb::WHITE.scaled(level));
            strip.show();
            if !self.ramp_step_delay.is_zero() {
                thread::sleep(self.ramp_step_delay);
            }
        }
        self.layout.stairs[index].brightness = target;
    }

    fn dispatch_sound<S, A>(&mut self, audio: &mut AudioPlayer<S, A>, index: usize, now: Instant)
    where
        S: DeviceStack,
        A: AudioOutput,
    {
        let stair = &self.layout.stairs[index];
        let Some(sound) = stair.sound.clone() else {
            return;
        };

        let ready = stair
            .last_trigger
            .map(|last| now.duration_since(last) >= self.cooldown)
            .unwrap_or(true);
        if !ready {
            tracing::debug!(stair = stair.number, "trigger inside cooldown, sound skipped");
            return;
        }

        // The gate advances when the request is issued, not when it succeeds.
        self.layout.stairs[index].last_trigger = Some(now);
        let playback_channel = (index % MAX_PLAYBACK_CHANNELS) as u8;
        if !audio.play(playback_channel, &sound) {
            tracing::warn!(
                stair = self.layout.stairs[index].number,
                "sound skipped, audio unavailable"
            );
        }
    }
}
