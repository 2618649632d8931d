//! Core library for the stairlight interactive staircase installation.
//!
//! An array of time-of-flight distance sensors, reached through cascaded I2C
//! multiplexers, watches each stair of a flight; an addressable LED strip and
//! a Bluetooth speaker react to presence. The crate owns the reusable
//! engineering: exclusive-access arbitration of the shared bus, sensor
//! discovery and round-robin polling under partial hardware failure,
//! per-channel trigger edges with cooldown-gated dispatch, and resilient
//! audio connection management. Hardware is reached only through the narrow
//! capability traits in [`hal`], so everything here runs against the
//! simulator as well as the real installation.

pub mod audio;
pub mod bus;
pub mod config;
pub mod effects;
pub mod error;
pub mod hal;
pub mod runtime;
pub mod sensors;
pub mod trigger;

pub use audio::{AudioPlayer, ConnectionManager};
pub use bus::{split_channel, ChannelArbiter, Multiplexer, CHANNELS_PER_MULTIPLEXER};
pub use config::{
    AudioConfig, BusConfig, DistanceConfig, InstallationConfig, LightingConfig, LightingMode,
    StairConfig,
};
pub use effects::{ColorMap, EffectsDispatcher, Stair, StairLayout, MAX_PLAYBACK_CHANNELS};
pub use error::{Result, StairlightError};
pub use hal::{AudioOutput, DeviceStack, LedStrip, MultiplexerBus, RangingDriver, Rgb};
pub use runtime::Installation;
pub use sensors::{PollEvent, PollingScheduler, SensorRegistry, SensorSlot};
pub use trigger::{TriggerEdge, TriggerState, TriggerStateMachine};
