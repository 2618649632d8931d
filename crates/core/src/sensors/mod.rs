use std::time::{Duration, Instant};

use crate::bus::ChannelArbiter;
use crate::hal::{MultiplexerBus, RangingDriver};

/// One discovered sensor: the channel it sits on and its latest reading.
#[derive(Debug, Clone)]
pub struct SensorSlot {
    pub channel: usize,
    pub last_mm: Option<u16>,
}

/// Tracks the active sensor set in discovery order.
///
/// A slot exists only while its sensor keeps answering; a failed read
/// evicts it immediately and it is recreated by the next discovery pass.
#[derive(Debug)]
pub struct SensorRegistry<D> {
    driver: D,
    timing_budget_us: u32,
    slots: Vec<SensorSlot>,
}

impl<D: RangingDriver> SensorRegistry<D> {
    pub fn new(driver: D, timing_budget_us: u32) -> Self {
        Self {
            driver,
            timing_budget_us,
            slots: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[SensorSlot] {
        &self.slots
    }

    pub fn last_reading(&self, channel: usize) -> Option<u16> {
        self.slots
            .iter()
            .find(|slot| slot.channel == channel)
            .and_then(|slot| slot.last_mm)
    }

    /// Attempts sensor bring-up on `channel`; appends a slot on success.
    /// The channel must already be selected on the bus.
    fn try_init(&mut self, channel: usize) -> bool {
        if !self.driver.initialize(channel, self.timing_budget_us) {
            return false;
        }
        self.slots.push(SensorSlot {
            channel,
            last_mm: None,
        });
        true
    }

    fn read(&mut self, slot_index: usize) -> Option<u16> {
        let channel = self.slots[slot_index].channel;
        self.driver.read_distance_mm(channel)
    }

    fn record(&mut self, slot_index: usize, mm: u16) {
        self.slots[slot_index].last_mm = Some(mm);
    }

    fn evict(&mut self, slot_index: usize) -> usize {
        self.slots.remove(slot_index).channel
    }
}

/// What one scheduler tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// Nothing was due: no sensors and the discovery backoff has not elapsed.
    Idle,
    /// A discovery pass ran and found nothing.
    DiscoveryFailed,
    /// A discovery pass brought up this many sensors.
    Discovered(usize),
    /// The round-robin read of `channel` succeeded.
    Reading { channel: usize, distance_mm: u16 },
    /// `channel` failed its read and left the active set. The caller must
    /// drop any per-channel state it keeps for it.
    Evicted { channel: usize },
}

/// Round-robins reads across the active set, one channel per tick.
///
/// Cadence is fixed and independent of the active-set size: a shrinking set
/// raises the per-sensor refresh rate instead of the tick cost. Discovery
/// runs only while the set is empty, at a fixed backoff.
#[derive(Debug)]
pub struct PollingScheduler {
    cursor: usize,
    discovery_retry: Duration,
    last_discovery: Option<Instant>,
}

impl PollingScheduler {
    pub fn new(discovery_retry: Duration) -> Self {
        Self {
            cursor: 0,
            discovery_retry,
            last_discovery: None,
        }
    }

    /// Runs one tick: a discovery pass when the active set is empty and the
    /// backoff has elapsed, otherwise one round-robin read.
    pub fn tick<B, D>(
        &mut self,
        arbiter: &mut ChannelArbiter<B>,
        registry: &mut SensorRegistry<D>,
        now: Instant,
    ) -> PollEvent
    where
        B: MultiplexerBus,
        D: RangingDriver,
    {
        if registry.is_empty() {
            let waiting = self
                .last_discovery
                .is_some_and(|last| now.duration_since(last) < self.discovery_retry);
            if waiting {
                return PollEvent::Idle;
            }

            self.last_discovery = Some(now);
            self.cursor = 0;
            let found = discover(arbiter, registry);
            return if found == 0 {
                tracing::debug!("discovery found no sensors, will retry");
                PollEvent::DiscoveryFailed
            } else {
                tracing::info!(count = found, "discovery brought sensors online");
                PollEvent::Discovered(found)
            };
        }

        let slot_index = self.cursor % registry.len();
        let channel = registry.slots()[slot_index].channel;

        let reading = match arbiter.select(channel) {
            Ok(()) => registry.read(slot_index),
            Err(error) => {
                tracing::warn!(channel, %error, "channel select failed during poll");
                None
            }
        };

        match reading {
            Some(mm) => {
                registry.record(slot_index, mm);
                self.cursor = (slot_index + 1) % registry.len();
                PollEvent::Reading {
                    channel,
                    distance_mm: mm,
                }
            }
            None => {
                registry.evict(slot_index);
                self.cursor = if registry.is_empty() {
                    0
                } else {
                    slot_index % registry.len()
                };
                tracing::warn!(channel, "sensor evicted after failed read");
                PollEvent::Evicted { channel }
            }
        }
    }
}

/// Walks every global channel once, bringing up whatever answers.
/// Chips that failed their probe reject the select and are skipped.
fn discover<B, D>(arbiter: &mut ChannelArbiter<B>, registry: &mut SensorRegistry<D>) -> usize
where
    B: MultiplexerBus,
    D: RangingDriver,
{
    let mut found = 0;
    for channel in 0..arbiter.max_channels() {
        if arbiter.select(channel).is_err() {
            continue;
        }
        if registry.try_init(channel) {
            tracing::info!(channel, "sensor initialized");
            found += 1;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{SimBus, SimRanging};
    use std::time::Duration;

    fn arbiter() -> ChannelArbiter<SimBus> {
        ChannelArbiter::new(SimBus::new(&[0x70, 0x71]), &[0x70, 0x71], Duration::ZERO).unwrap()
    }

    fn registry(driver: SimRanging) -> SensorRegistry<SimRanging> {
        SensorRegistry::new(driver, 33_000)
    }

    #[test]
    fn discovery_finds_fitted_channels_in_order() {
        let mut driver = SimRanging::new();
        driver.fit_steady(2, 900).fit_steady(9, 400);

        let mut arbiter = arbiter();
        let mut registry = registry(driver);
        let mut scheduler = PollingScheduler::new(Duration::from_secs(5));

        let event = scheduler.tick(&mut arbiter, &mut registry, Instant::now());
        assert_eq!(event, PollEvent::Discovered(2));
        let channels: Vec<usize> = registry.slots().iter().map(|s| s.channel).collect();
        assert_eq!(channels, vec![2, 9]);
    }

    #[test]
    fn discovery_applies_the_timing_budget() {
        let mut driver = SimRanging::new();
        driver.fit_steady(0, 500);

        let mut arbiter = arbiter();
        let mut registry = registry(driver);
        let mut scheduler = PollingScheduler::new(Duration::from_secs(5));
        scheduler.tick(&mut arbiter, &mut registry, Instant::now());

        assert_eq!(registry.driver.budget(0), Some(33_000));
    }

    #[test]
    fn discovery_backs_off_until_the_retry_interval_elapses() {
        let mut arbiter = arbiter();
        let mut registry = registry(SimRanging::new());
        let mut scheduler = PollingScheduler::new(Duration::from_secs(5));

        let start = Instant::now();
        assert_eq!(
            scheduler.tick(&mut arbiter, &mut registry, start),
            PollEvent::DiscoveryFailed
        );
        assert_eq!(
            scheduler.tick(&mut arbiter, &mut registry, start + Duration::from_secs(1)),
            PollEvent::Idle
        );
        assert_eq!(
            scheduler.tick(&mut arbiter, &mut registry, start + Duration::from_secs(6)),
            PollEvent::DiscoveryFailed
        );
    }

    #[test]
    fn polling_round_robins_one_channel_per_tick() {
        let mut driver = SimRanging::new();
        driver.fit_steady(0, 100).fit_steady(1, 200);

        let mut arbiter = arbiter();
        let mut registry = registry(driver);
        let mut scheduler = PollingScheduler::new(Duration::from_secs(5));
        let now = Instant::now();
        scheduler.tick(&mut arbiter, &mut registry, now);

        let mut seen = Vec::new();
        for _ in 0..4 {
            if let PollEvent::Reading { channel, .. } =
                scheduler.tick(&mut arbiter, &mut registry, now)
            {
                seen.push(channel);
            }
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    #[test]
    fn a_null_reading_evicts_the_channel_on_the_same_tick() {
        let mut driver = SimRanging::new();
        driver.fit_steady(0, 100).fit_steady(1, 200);
        driver.push_reading(0, None);

        let mut arbiter = arbiter();
        let mut registry = registry(driver);
        let mut scheduler = PollingScheduler::new(Duration::from_secs(5));
        let now = Instant::now();
        scheduler.tick(&mut arbiter, &mut registry, now);

        assert_eq!(
            scheduler.tick(&mut arbiter, &mut registry, now),
            PollEvent::Evicted { channel: 0 }
        );
        assert_eq!(registry.len(), 1);

        // Round robin continues over the surviving channel only.
        assert_eq!(
            scheduler.tick(&mut arbiter, &mut registry, now),
            PollEvent::Reading {
                channel: 1,
                distance_mm: 200
            }
        );
    }

    #[test]
    fn emptying_the_active_set_resumes_discovery_after_backoff() {
        let mut driver = SimRanging::new();
        driver.fit(0);
        driver.push_reading(0, None);

        let mut arbiter = arbiter();
        let mut registry = registry(driver);
        let mut scheduler = PollingScheduler::new(Duration::from_secs(5));

        let start = Instant::now();
        scheduler.tick(&mut arbiter, &mut registry, start);
        assert_eq!(
            scheduler.tick(&mut arbiter, &mut registry, start),
            PollEvent::Evicted { channel: 0 }
        );

        // Inside the backoff window nothing happens; after it, discovery
        // brings the sensor back because initialization still succeeds.
        assert_eq!(
            scheduler.tick(&mut arbiter, &mut registry, start + Duration::from_secs(1)),
            PollEvent::Idle
        );
        assert_eq!(
            scheduler.tick(&mut arbiter, &mut registry, start + Duration::from_secs(6)),
            PollEvent::Discovered(1)
        );
    }

    #[test]
    fn successful_readings_update_the_registry() {
        let mut driver = SimRanging::new();
        driver.fit_steady(3, 777);

        let mut arbiter = arbiter();
        let mut registry = registry(driver);
        let mut scheduler = PollingScheduler::new(Duration::from_secs(5));
        let now = Instant::now();
        scheduler.tick(&mut arbiter, &mut registry, now);
        scheduler.tick(&mut arbiter, &mut registry, now);

        assert_eq!(registry.last_reading(3), Some(777));
    }
}
