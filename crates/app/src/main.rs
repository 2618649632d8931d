use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use stairlight_core::hal::sim::{SimAudio, SimBus, SimDeviceStack, SimRanging, SimStrip};
use stairlight_core::{ChannelArbiter, Installation, InstallationConfig, LedStrip, Rgb};
use tracing_subscriber::EnvFilter;

fn main() -> stairlight_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            duration_secs,
        } => run_simulated(config.as_deref(), duration_secs),
        Commands::Scan { config } => run_scan(config.as_deref()),
        Commands::CheckLeds { config } => run_check_leds(config.as_deref()),
    }
}

/// Runs the whole installation against the simulator hardware, with a
/// scripted visitor stepping onto the first stair.
fn run_simulated(config: Option<&Path>, duration_secs: u64) -> stairlight_core::Result<()> {
    let config = load_config(config)?;
    tracing::info!(stairs = config.stairs.len(), "starting simulated run");

    let bus = SimBus::new(&config.bus.multiplexer_addresses);
    let mut driver = SimRanging::new();
    for stair in &config.stairs {
        if let Some(channel) = stair.channel {
            driver.fit_steady(channel, 1_500);
        }
    }
    if let Some(channel) = config.stairs.iter().find_map(|stair| stair.channel) {
        // Approach, stand on the stair for a while, leave.
        for mm in [1_200, 900, 600, 400, 400, 400, 900, 1_500] {
            driver.push_reading(channel, Some(mm));
        }
    }

    let strip_len: usize = config.stairs.iter().map(|stair| stair.led_count).sum();
    let strip = SimStrip::new(strip_len);
    let stack = SimDeviceStack::new(&[(config.audio.device_name.as_str(), "00:11:22:33:44:55")]);

    let mut installation =
        Installation::new(&config, bus, driver, strip, stack, SimAudio::new())?;

    let stop = Arc::new(AtomicBool::new(false));
    let timer_flag = stop.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(duration_secs));
        timer_flag.store(true, Ordering::Relaxed);
    });

    installation.run(&stop)?;
    tracing::info!(
        plays = installation.audio().output().played().len(),
        "simulated run finished"
    );
    Ok(())
}

/// Probes the configured multiplexer addresses and reports what answered.
fn run_scan(config: Option<&Path>) -> stairlight_core::Result<()> {
    let config = load_config(config)?;
    let bus = SimBus::new(&config.bus.multiplexer_addresses);
    let arbiter = ChannelArbiter::new(bus, &config.bus.multiplexer_addresses, Duration::ZERO)?;

    for mux in arbiter.multiplexers() {
        tracing::info!(working = mux.working, "multiplexer 0x{:02x}", mux.address);
    }
    tracing::info!(
        channels = arbiter.max_channels(),
        working = arbiter.working_count(),
        "scan complete"
    );
    Ok(())
}

/// Wipes the strip through red, green and blue, then dark.
fn run_check_leds(config: Option<&Path>) -> stairlight_core::Result<()> {
    let config = load_config(config)?;
    let strip_len: usize = config.stairs.iter().map(|stair| stair.led_count).sum();
    let mut strip = SimStrip::new(strip_len);

    for color in [Rgb::new(255, 0, 0), Rgb::new(0, 255, 0), Rgb::new(0, 0, 255)] {
        for index in 0..strip.pixel_count() {
            strip.set_pixel(index, color);
        }
        strip.show();
        tracing::info!(?color, pixels = strip.pixel_count(), "wipe");
        thread::sleep(Duration::from_millis(config.lighting.self_test_hold_ms));
    }
    for index in 0..strip.pixel_count() {
        strip.set_pixel(index, Rgb::BLACK);
    }
    strip.show();
    tracing::info!(flushes = strip.show_count(), "LED check complete");
    Ok(())
}

fn load_config(path: Option<&Path>) -> stairlight_core::Result<InstallationConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            InstallationConfig::load(path)
        }
        None => Ok(InstallationConfig::default()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Presence-reactive stair lighting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the installation loop against the simulator hardware.
    Run {
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// How long to run before shutting down.
        #[arg(short, long, default_value_t = 10)]
        duration_secs: u64,
    },
    /// Probe the multiplexer addresses and report what answers.
    Scan {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Wipe the strip through red, green and blue to verify the segments.
    CheckLeds {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
