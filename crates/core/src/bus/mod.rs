use std::thread;
use std::time::Duration;

use crate::hal::MultiplexerBus;
use crate::{Result, StairlightError};

/// Downstream channels per multiplexer chip.
pub const CHANNELS_PER_MULTIPLEXER: usize = 8;

/// One multiplexer chip known to the arbiter. Probed once at startup;
/// a chip that fails its probe permanently excludes its eight channels.
#[derive(Debug, Clone)]
pub struct Multiplexer {
    pub address: u8,
    pub working: bool,
}

/// Splits a global channel into `(multiplexer ordinal, local channel)`.
pub fn split_channel(global: usize) -> (usize, usize) {
    (
        global / CHANNELS_PER_MULTIPLEXER,
        global % CHANNELS_PER_MULTIPLEXER,
    )
}

/// Enforces single-channel-at-a-time exclusivity on the shared bus.
///
/// Sensors behind different multiplexer channels share one I2C address, so
/// at most one channel may be enabled across *all* chips at any instant.
/// The bus carries no readable state, so [`ChannelArbiter::select`] always
/// runs the full disable-everything-then-enable-one protocol, even when
/// re-selecting the channel that is already active.
#[derive(Debug)]
pub struct ChannelArbiter<B> {
    bus: B,
    multiplexers: Vec<Multiplexer>,
    settle: Duration,
}

impl<B: MultiplexerBus> ChannelArbiter<B> {
    /// Probes every configured address and starts with all channels disabled.
    ///
    /// A chip that does not answer is marked non-working and skipped from
    /// then on; the constructor fails only when no chip answers at all.
    pub fn new(mut bus: B, addresses: &[u8], settle: Duration) -> Result<Self> {
        let multiplexers: Vec<Multiplexer> = addresses
            .iter()
            .map(|&address| {
                let working = bus.probe_presence(address);
                if working {
                    tracing::info!("multiplexer found at 0x{address:02x}");
                } else {
                    tracing::warn!(
                        "multiplexer at 0x{address:02x} did not answer probe, excluding its channels"
                    );
                }
                Multiplexer { address, working }
            })
            .collect();

        if !multiplexers.iter().any(|mux| mux.working) {
            return Err(StairlightError::NoWorkingMultiplexer);
        }

        let mut arbiter = Self {
            bus,
            multiplexers,
            settle,
        };
        arbiter.disable_all()?;
        Ok(arbiter)
    }

    /// Total channel count across all configured chips, working or not.
    /// Global indices keep their meaning even when a chip is down.
    pub fn max_channels(&self) -> usize {
        self.multiplexers.len() * CHANNELS_PER_MULTIPLEXER
    }

    pub fn multiplexers(&self) -> &[Multiplexer] {
        &self.multiplexers
    }

    pub fn working_count(&self) -> usize {
        self.multiplexers.iter().filter(|mux| mux.working).count()
    }

    /// Writes a zero mask to every working chip, disabling all channels.
    pub fn disable_all(&mut self) -> Result<()> {
        for mux in self.multiplexers.iter().filter(|mux| mux.working) {
            if !self.bus.write_channel_mask(mux.address, 0) {
                return Err(StairlightError::BusWrite(mux.address));
            }
        }
        Ok(())
    }

    /// Makes `global` the only enabled channel on the bus, then waits the
    /// settle interval so the downstream sensor is addressable.
    ///
    /// Fails without touching the bus when the channel is out of range or
    /// its chip failed the startup probe.
    pub fn select(&mut self, global: usize) -> Result<()> {
        if global >= self.max_channels() {
            return Err(StairlightError::ChannelInvalid(global));
        }

        let (ordinal, local) = split_channel(global);
        let address = {
            let mux = &self.multiplexers[ordinal];
            if !mux.working {
                return Err(StairlightError::MultiplexerDown(mux.address));
            }
            mux.address
        };

        self.disable_all()?;
        if !self.bus.write_channel_mask(address, 1 << local) {
            return Err(StairlightError::BusWrite(address));
        }
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        Ok(())
    }

    /// Shared access to the underlying bus, mainly for inspection in tests.
    pub fn bus(&self) -> &B {
        &self.bus
    }
}
