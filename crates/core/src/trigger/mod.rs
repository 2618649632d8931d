use std::collections::HashMap;

/// Binary presence state derived from a channel's distance readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Clear,
    Triggered,
}

/// A state change between two consecutive readings of the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEdge {
    /// `Clear` to `Triggered`: something entered the trigger distance.
    Rose,
    /// `Triggered` to `Clear`: the channel opened up again.
    Fell,
}

/// Derives debounced per-channel trigger states and reports edges.
///
/// A channel is `Triggered` iff its distance is strictly below the
/// threshold; a reading exactly at the threshold is `Clear`. The sole
/// debounce is the previous-sample comparison: there is no hysteresis band,
/// so noise sitting right at the threshold can re-trigger rapidly. That
/// limitation is deliberate and kept from the fielded behaviour.
#[derive(Debug)]
pub struct TriggerStateMachine {
    threshold_mm: f32,
    states: HashMap<usize, TriggerState>,
}

impl TriggerStateMachine {
    pub fn new(threshold_mm: f32) -> Self {
        Self {
            threshold_mm,
            states: HashMap::new(),
        }
    }

    pub fn threshold_mm(&self) -> f32 {
        self.threshold_mm
    }

    /// Feeds one reading for `channel` and returns the edge it caused, if
    /// any. A channel never seen before starts from `Clear`.
    pub fn observe(&mut self, channel: usize, distance_mm: f32) -> Option<TriggerEdge> {
        let next = if distance_mm < self.threshold_mm {
            TriggerState::Triggered
        } else {
            TriggerState::Clear
        };
        let previous = self
            .states
            .insert(channel, next)
            .unwrap_or(TriggerState::Clear);

        match (previous, next) {
            (TriggerState::Clear, TriggerState::Triggered) => Some(TriggerEdge::Rose),
            (TriggerState::Triggered, TriggerState::Clear) => Some(TriggerEdge::Fell),
            _ => None,
        }
    }

    /// Current state of `channel`, or `None` when it is not tracked.
    pub fn state(&self, channel: usize) -> Option<TriggerState> {
        self.states.get(&channel).copied()
    }

    /// Drops all state for an evicted channel so re-discovery starts clean.
    pub fn forget(&mut self, channel: usize) {
        self.states.remove(&channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_crossing_yields_exactly_one_rising_edge() {
        let mut machine = TriggerStateMachine::new(685.8);

        assert_eq!(machine.observe(0, 1_500.0), None);
        assert_eq!(machine.observe(0, 500.0), Some(TriggerEdge::Rose));
        for _ in 0..10 {
            assert_eq!(machine.observe(0, 400.0), None);
        }
    }

    #[test]
    fn exactly_at_threshold_is_clear() {
        let mut machine = TriggerStateMachine::new(685.8);
        machine.observe(0, 685.8);
        assert_eq!(machine.state(0), Some(TriggerState::Clear));
    }

    #[test]
    fn leaving_the_window_yields_a_falling_edge() {
        let mut machine = TriggerStateMachine::new(685.8);
        machine.observe(0, 300.0);
        assert_eq!(machine.observe(0, 900.0), Some(TriggerEdge::Fell));
        assert_eq!(machine.observe(0, 900.0), None);
    }

    #[test]
    fn first_reading_below_threshold_rises_immediately() {
        let mut machine = TriggerStateMachine::new(685.8);
        assert_eq!(machine.observe(4, 100.0), Some(TriggerEdge::Rose));
    }

    #[test]
    fn channels_are_independent() {
        let mut machine = TriggerStateMachine::new(685.8);
        machine.observe(0, 300.0);
        assert_eq!(machine.observe(1, 900.0), None);
        assert_eq!(machine.state(0), Some(TriggerState::Triggered));
        assert_eq!(machine.state(1), Some(TriggerState::Clear));
    }

    #[test]
    fn forgetting_a_channel_resets_it_to_untracked() {
        let mut machine = TriggerStateMachine::new(685.8);
        machine.observe(0, 300.0);
        machine.forget(0);

        assert_eq!(machine.state(0), None);
        // Re-discovery starts from Clear, so a below-threshold reading is a
        // fresh rising edge rather than a continuation.
        assert_eq!(machine.observe(0, 300.0), Some(TriggerEdge::Rose));
    }
}
