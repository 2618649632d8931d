use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{AudioPlayer, ConnectionManager};
use crate::bus::ChannelArbiter;
use crate::config::InstallationConfig;
use crate::effects::EffectsDispatcher;
use crate::hal::{AudioOutput, DeviceStack, LedStrip, MultiplexerBus, RangingDriver, Rgb};
use crate::sensors::{PollEvent, PollingScheduler, SensorRegistry};
use crate::trigger::{TriggerState, TriggerStateMachine};
use crate::Result;

const IDLE_SLEEP: Duration = Duration::from_millis(1);
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// The assembled installation: one instance owns every component and the
/// single control thread's state.
///
/// Everything happens inside [`Installation::tick`], in a fixed order:
/// discovery-or-poll, trigger evaluation, LED/audio dispatch, status. All
/// collaborator calls are synchronous, so the worst-case tick latency is the
/// sum of the slowest calls made that tick; with at most sixteen sensors and
/// a soft tens-of-Hz target that is an accepted simplicity tradeoff. No
/// timeout guards individual bus calls: stalled hardware stalls the loop.
#[derive(Debug)]
pub struct Installation<B, D, L, S, A> {
    arbiter: ChannelArbiter<B>,
    registry: SensorRegistry<D>,
    scheduler: PollingScheduler,
    triggers: TriggerStateMachine,
    effects: EffectsDispatcher,
    audio: AudioPlayer<S, A>,
    strip: L,
    poll_interval: Duration,
    self_test: bool,
    self_test_hold: Duration,
    last_status: Option<Instant>,
}

impl<B, D, L, S, A> Installation<B, D, L, S, A>
where
    B: MultiplexerBus,
    D: RangingDriver,
    L: LedStrip,
    S: DeviceStack,
    A: AudioOutput,
{
    /// Wires every component from the configuration and the given hardware.
    ///
    /// This is where the single fatal condition surfaces: if no multiplexer
    /// answers its probe the arbiter constructor fails and no tick ever runs.
    pub fn new(
        config: &InstallationConfig,
        bus: B,
        driver: D,
        strip: L,
        stack: S,
        output: A,
    ) -> Result<Self> {
        config.validate()?;
        let arbiter = ChannelArbiter::new(bus, &config.bus.multiplexer_addresses, config.bus.settle())?;
        let effects = EffectsDispatcher::new(config, strip.pixel_count())?;
        let connection = ConnectionManager::new(
            stack,
            &config.audio.device_name,
            config.audio.connect_attempts,
            config.audio.connect_backoff(),
        );

        Ok(Self {
            arbiter,
            registry: SensorRegistry::new(driver, config.bus.timing_budget_us),
            scheduler: PollingScheduler::new(config.bus.discovery_retry()),
            triggers: TriggerStateMachine::new(config.distance.trigger_mm),
            effects,
            audio: AudioPlayer::new(connection, output),
            strip,
            poll_interval: config.bus.poll_interval(),
            self_test: config.lighting.self_test,
            self_test_hold: config.lighting.self_test_hold(),
            last_status: None,
        })
    }

    /// Runs the control loop until `stop` is raised.
    ///
    /// Whatever phase the last tick was in, the strip is painted dark and
    /// flushed before this returns.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        if self.self_test {
            self.strip_self_test();
        }

        let mut last_tick: Option<Instant> = None;
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            let due = last_tick
                .map(|last| now.duration_since(last) >= self.poll_interval)
                .unwrap_or(true);
            if !due {
                thread::sleep(IDLE_SLEEP);
                continue;
            }

            last_tick = Some(now);
            if !self.tick(now) {
                thread::sleep(IDLE_SLEEP);
            }
        }

        self.effects.blackout(&mut self.strip);
        tracing::info!("strip blacked out, loop stopped");
        Ok(())
    }

    /// Executes one tick and reports whether any work was due.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self
            .scheduler
            .tick(&mut self.arbiter, &mut self.registry, now)
        {
            PollEvent::Idle => false,
            PollEvent::DiscoveryFailed | PollEvent::Discovered(_) => true,
            PollEvent::Evicted { channel } => {
                self.triggers.forget(channel);
                self.effects.release_channel(channel);
                true
            }
            PollEvent::Reading {
                channel,
                distance_mm,
            } => {
                let mm = f32::from(distance_mm);
                if let Some(edge) = self.triggers.observe(channel, mm) {
                    self.effects
                        .handle_edge(&mut self.strip, &mut self.audio, channel, edge, now);
                }
                self.effects.paint_reading(&mut self.strip, channel, mm);
                self.status(now, channel, mm);
                true
            }
        }
    }

    pub fn registry(&self) -> &SensorRegistry<D> {
        &self.registry
    }

    pub fn triggers(&self) -> &TriggerStateMachine {
        &self.triggers
    }

    pub fn audio(&self) -> &AudioPlayer<S, A> {
        &self.audio
    }

    pub fn strip(&self) -> &L {
        &self.strip
    }

    pub fn arbiter(&self) -> &ChannelArbiter<B> {
        &self.arbiter
    }

    /// Red, green, blue across the whole strip, then dark: a visual check
    /// that power and data reach every pixel before the loop starts.
    fn strip_self_test(&mut self) {
        tracing::info!("running LED self test");
        for color in [Rgb::new(255, 0, 0), Rgb::new(0, 255, 0), Rgb::new(0, 0, 255)] {
            for index in 0..self.strip.pixel_count() {
                self.strip.set_pixel(index, color);
            }
            self.strip.show();
            if !self.self_test_hold.is_zero() {
                thread::sleep(self.self_test_hold);
            }
        }
        self.effects.blackout(&mut self.strip);
    }

    fn status(&mut self, now: Instant, channel: usize, distance_mm: f32) {
        let due = self
            .last_status
            .map(|last| now.duration_since(last) >= STATUS_INTERVAL)
            .unwrap_or(true);
        if !due {
            return;
        }
        self.last_status = Some(now);
        let triggered = self.triggers.state(channel) == Some(TriggerState::Triggered);
        tracing::info!(channel, distance_mm, triggered, "reading");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LightingMode, StairConfig};
    use crate::hal::sim::{SimAudio, SimBus, SimDeviceStack, SimRanging, SimStrip};
    use crate::hal::Rgb;
    use crate::StairlightError;
    use std::path::PathBuf;

    fn test_config() -> InstallationConfig {
        let mut config = InstallationConfig::default();
        config.bus.settle_ms = 0;
        config.bus.poll_interval_ms = 0;
        config.audio.connect_backoff_ms = 0;
        config.lighting.mode = LightingMode::RampOnTrigger;
        config.lighting.ramp_steps = 2;
        config.lighting.ramp_step_delay_ms = 0;
        config.lighting.self_test = false;
        config.stairs = vec![
            StairConfig {
                number: 1,
                channel: Some(0),
                led_count: 5,
                sound: Some(PathBuf::from("one.wav")),
            },
            StairConfig {
                number: 2,
                channel: Some(9),
                led_count: 5,
                sound: Some(PathBuf::from("two.wav")),
            },
        ];
        config
    }

    fn installation(
        driver: SimRanging,
    ) -> Installation<SimBus, SimRanging, SimStrip, SimDeviceStack, SimAudio> {
        Installation::new(
            &test_config(),
            SimBus::new(&[0x70, 0x71]),
            driver,
            SimStrip::new(10),
            SimDeviceStack::new(&[("JBL GO 2+", "BB:22")]),
            SimAudio::new(),
        )
        .unwrap()
    }

    #[test]
    fn zero_working_multiplexers_fails_before_any_tick() {
        let result = Installation::new(
            &test_config(),
            SimBus::new(&[]),
            SimRanging::new(),
            SimStrip::new(10),
            SimDeviceStack::new(&[]),
            SimAudio::new(),
        );
        assert!(matches!(
            result,
            Err(StairlightError::NoWorkingMultiplexer)
        ));
    }

    #[test]
    fn a_close_reading_lights_the_stair_and_plays_its_sound() {
        let mut driver = SimRanging::new();
        driver.fit_steady(0, 300);

        let mut installation = installation(driver);
        let now = Instant::now();
        installation.tick(now); // discovery
        installation.tick(now); // first reading, rising edge

        assert_eq!(installation.strip().pixels()[0], Rgb::WHITE);
        assert_eq!(installation.strip().pixels()[4], Rgb::WHITE);
        assert_eq!(installation.strip().pixels()[5], Rgb::BLACK);
        assert_eq!(installation.audio().output().played().len(), 1);
    }

    #[test]
    fn both_multiplexers_feed_their_stairs() {
        let mut driver = SimRanging::new();
        driver.fit_steady(0, 2_000).fit_steady(9, 300);

        let mut installation = installation(driver);
        let now = Instant::now();
        installation.tick(now); // discovery
        installation.tick(now); // channel 0, clear
        installation.tick(now); // channel 9, rising edge

        assert_eq!(installation.strip().pixels()[0], Rgb::BLACK);
        assert_eq!(installation.strip().pixels()[5], Rgb::WHITE);
    }

    #[test]
    fn eviction_clears_the_channel_trigger_state() {
        let mut driver = SimRanging::new();
        driver.fit_steady(0, 300);
        driver.push_reading(0, Some(300));
        driver.push_reading(0, None);

        let mut installation = installation(driver);
        let now = Instant::now();
        installation.tick(now); // discovery
        installation.tick(now); // triggered
        assert_eq!(
            installation.triggers().state(0),
            Some(crate::trigger::TriggerState::Triggered)
        );

        installation.tick(now); // failed read, eviction
        assert!(installation.registry().is_empty());
        assert_eq!(installation.triggers().state(0), None);
    }

    #[test]
    fn run_blacks_out_the_strip_on_shutdown() {
        let mut driver = SimRanging::new();
        driver.fit_steady(0, 300);

        let mut installation = installation(driver);
        let stop = AtomicBool::new(true);
        installation.run(&stop).unwrap();

        assert!(installation
            .strip()
            .pixels()
            .iter()
            .all(|&p| p == Rgb::BLACK));
        assert!(installation.strip().show_count() > 0);
    }
}
