use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::hal::{AudioOutput, DeviceStack};

/// Resolves the configured output device and keeps its connection alive.
///
/// The device is found by substring match against the names the stack
/// reports, taking the first hit; resolution is best-effort and an absent
/// device is an explicit failure, not a panic. Connection state is cached
/// and only re-checked when a caller asks to connect again.
#[derive(Debug)]
pub struct ConnectionManager<S> {
    stack: S,
    device_name: String,
    address: Option<String>,
    connected: bool,
    attempts: u32,
    backoff: Duration,
}

impl<S: DeviceStack> ConnectionManager<S> {
    pub fn new(stack: S, device_name: &str, attempts: u32, backoff: Duration) -> Self {
        Self {
            stack,
            device_name: device_name.to_string(),
            address: None,
            connected: false,
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The resolved device address, once a lookup has succeeded.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Marks the cached connection state stale after a playback failure.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    fn resolve_address(&mut self) -> Option<String> {
        if self.address.is_none() {
            self.address = self
                .stack
                .list_devices()
                .into_iter()
                .find(|(name, _)| name.contains(&self.device_name))
                .map(|(_, address)| address);
            match &self.address {
                Some(address) => {
                    tracing::info!(device = %self.device_name, %address, "output device resolved")
                }
                None => tracing::warn!(device = %self.device_name, "no matching output device"),
            }
        }
        self.address.clone()
    }

    /// Ensures the output device is connected.
    ///
    /// Succeeds immediately when the stack already reports the device
    /// connected; otherwise powers the adapter on and retries the connect a
    /// bounded number of times with a fixed backoff between attempts.
    pub fn connect(&mut self) -> bool {
        let Some(address) = self.resolve_address() else {
            self.connected = false;
            return false;
        };

        if self.stack.query_connected(&address) {
            self.connected = true;
            return true;
        }

        self.stack.power_on();
        for attempt in 1..=self.attempts {
            tracing::debug!(attempt, total = self.attempts, "connecting output device");
            if self.stack.connect(&address) {
                tracing::info!(%address, "output device connected");
                self.connected = true;
                return true;
            }
            if attempt < self.attempts && !self.backoff.is_zero() {
                thread::sleep(self.backoff);
            }
        }

        tracing::warn!(%address, "output device unreachable, continuing without audio");
        self.connected = false;
        false
    }
}

/// Issues playback on a pool of independent logical channels, reconnecting
/// on failure. Playback is fire-and-forget; a request that cannot be served
/// is skipped, never queued.
#[derive(Debug)]
pub struct AudioPlayer<S, A> {
    connection: ConnectionManager<S>,
    output: A,
}

impl<S: DeviceStack, A: AudioOutput> AudioPlayer<S, A> {
    pub fn new(connection: ConnectionManager<S>, output: A) -> Self {
        Self { connection, output }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<S> {
        &mut self.connection
    }

    /// Shared access to the output backend, mainly for inspection in tests.
    pub fn output(&self) -> &A {
        &self.output
    }

    /// Plays `sound` on a logical channel, lazily connecting first.
    ///
    /// The channel is latest-wins: whatever it was playing is stopped before
    /// the new sound starts, while other channels keep playing. A failed
    /// playback gets exactly one reconnect-and-retry cycle; if that also
    /// fails the player marks itself disconnected and gives up on this
    /// request.
    pub fn play(&mut self, channel: u8, sound: &Path) -> bool {
        if !self.connection.is_connected() && !self.connection.connect() {
            return false;
        }

        self.output.stop_channel(channel);
        if self.output.play_on_channel(channel, sound) {
            return true;
        }

        tracing::warn!(channel, "playback failed, reconnecting once");
        if self.connection.connect() {
            self.output.stop_channel(channel);
            if self.output.play_on_channel(channel, sound) {
                return true;
            }
        }

        self.connection.mark_disconnected();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{SimAudio, SimDeviceStack};
    use std::path::PathBuf;

    const SPEAKER: &[(&str, &str)] = &[
        ("Living Room TV", "AA:10"),
        ("JBL GO 2+", "BB:22"),
        ("Kitchen Display", "CC:33"),
    ];

    fn manager(stack: SimDeviceStack) -> ConnectionManager<SimDeviceStack> {
        ConnectionManager::new(stack, "JBL GO", 3, Duration::ZERO)
    }

    fn sound() -> PathBuf {
        PathBuf::from("stair_trigger.wav")
    }

    #[test]
    fn resolves_device_by_name_substring() {
        let mut manager = manager(SimDeviceStack::new(SPEAKER));
        assert!(manager.connect());
        assert_eq!(manager.address(), Some("BB:22"));
    }

    #[test]
    fn unknown_device_fails_without_connecting() {
        let mut manager = ConnectionManager::new(
            SimDeviceStack::new(&[("Some Other Speaker", "DD:44")]),
            "JBL GO",
            3,
            Duration::ZERO,
        );
        assert!(!manager.connect());
        assert!(!manager.is_connected());
    }

    #[test]
    fn already_connected_device_short_circuits() {
        let mut stack = SimDeviceStack::new(SPEAKER);
        stack.preconnect("BB:22");

        let mut manager = manager(stack);
        assert!(manager.connect());
        assert_eq!(manager.stack.connect_calls(), 0);
    }

    #[test]
    fn connect_retries_up_to_three_attempts() {
        let mut stack = SimDeviceStack::new(SPEAKER);
        stack.push_connect_result(false).push_connect_result(false);

        let mut manager = manager(stack);
        assert!(manager.connect());
        assert!(manager.stack.powered());
        assert_eq!(manager.stack.connect_calls(), 3);
    }

    #[test]
    fn connect_gives_up_after_the_attempt_budget() {
        let mut stack = SimDeviceStack::new(SPEAKER);
        for _ in 0..3 {
            stack.push_connect_result(false);
        }

        let mut manager = manager(stack);
        assert!(!manager.connect());
        assert_eq!(manager.stack.connect_calls(), 3);
    }

    #[test]
    fn play_connects_lazily_and_stops_the_channel_first() {
        let connection = manager(SimDeviceStack::new(SPEAKER));
        let mut player = AudioPlayer::new(connection, SimAudio::new());

        assert!(player.play(2, &sound()));
        assert!(player.is_connected());
        assert_eq!(player.output.stopped(), &[2]);
        assert_eq!(player.output.played().len(), 1);
        assert_eq!(player.output.played()[0].0, 2);
    }

    #[test]
    fn play_without_a_reachable_device_is_skipped() {
        let mut stack = SimDeviceStack::new(&[]);
        stack.push_connect_result(false);

        let connection = manager(stack);
        let mut player = AudioPlayer::new(connection, SimAudio::new());

        assert!(!player.play(0, &sound()));
        assert!(player.output.played().is_empty());
    }

    #[test]
    fn playback_failure_retries_once_after_reconnect() {
        let mut output = SimAudio::new();
        output.push_play_result(false);

        let connection = manager(SimDeviceStack::new(SPEAKER));
        let mut player = AudioPlayer::new(connection, output);

        assert!(player.play(1, &sound()));
        // One stop per attempt: the failed one and the retry.
        assert_eq!(player.output.stopped(), &[1, 1]);
        assert_eq!(player.output.played().len(), 1);
    }

    #[test]
    fn double_playback_failure_marks_the_player_disconnected() {
        let mut output = SimAudio::new();
        output.push_play_result(false).push_play_result(false);

        let connection = manager(SimDeviceStack::new(SPEAKER));
        let mut player = AudioPlayer::new(connection, output);

        assert!(!player.play(1, &sound()));
        assert!(!player.is_connected());
    }

    #[test]
    fn channels_are_stopped_independently() {
        let connection = manager(SimDeviceStack::new(SPEAKER));
        let mut player = AudioPlayer::new(connection, SimAudio::new());

        assert!(player.play(0, &sound()));
        assert!(player.play(5, &sound()));
        assert_eq!(player.output.stopped(), &[0, 5]);
        assert_eq!(player.output.played().len(), 2);
    }
}
