//! Playback states and the walks between them.

use std::fmt;

/// Playback state of an element, bin or pipeline.
///
/// States form a line: `Stopped ↔ Prepared ↔ Playing`. Only adjacent
/// transitions are legal; a request that skips a state is resolved into the
/// intermediate transitions, executed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PlaybackState {
    /// Resources released; no traffic.
    #[default]
    Stopped,
    /// Resources allocated; no stream traffic yet.
    Prepared,
    /// Demand and buffers flow.
    Playing,
}

impl PlaybackState {
    /// The next adjacent state on the way to `target`, or `None` when
    /// already there.
    pub fn step_toward(self, target: PlaybackState) -> Option<PlaybackState> {
        use PlaybackState::*;
        match (self, target) {
            (a, b) if a == b => None,
            (Stopped, _) => Some(Prepared),
            (Prepared, Playing) => Some(Playing),
            (Prepared, Stopped) => Some(Stopped),
            (Playing, _) => Some(Prepared),
            (Prepared, Prepared) => unreachable!(),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Prepared => write!(f, "prepared"),
            PlaybackState::Playing => write!(f, "playing"),
        }
    }
}

/// One adjacent playback transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub from: PlaybackState,
    pub to: PlaybackState,
}

impl Transition {
    /// Name of the element callback dispatched for this transition.
    pub fn callback_name(self) -> &'static str {
        use PlaybackState::*;
        match (self.from, self.to) {
            (Stopped, Prepared) => "handle_stopped_to_prepared",
            (Prepared, Playing) => "handle_prepared_to_playing",
            (Playing, Prepared) => "handle_playing_to_prepared",
            (Prepared, Stopped) => "handle_prepared_to_stopped",
            _ => "handle_playback_change",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlaybackState::*;

    #[test]
    fn test_adjacent_steps() {
        assert_eq!(Stopped.step_toward(Prepared), Some(Prepared));
        assert_eq!(Prepared.step_toward(Playing), Some(Playing));
        assert_eq!(Playing.step_toward(Prepared), Some(Prepared));
        assert_eq!(Prepared.step_toward(Stopped), Some(Stopped));
    }

    #[test]
    fn test_same_state_is_noop() {
        for state in [Stopped, Prepared, Playing] {
            assert_eq!(state.step_toward(state), None);
        }
    }

    #[test]
    fn test_skipping_walks_through_prepared() {
        // Stopped -> Playing and Playing -> Stopped both pass Prepared.
        let mut state = Stopped;
        let mut walk = Vec::new();
        while let Some(next) = state.step_toward(Playing) {
            walk.push(next);
            state = next;
        }
        assert_eq!(walk, vec![Prepared, Playing]);

        let mut walk = Vec::new();
        while let Some(next) = state.step_toward(Stopped) {
            walk.push(next);
            state = next;
        }
        assert_eq!(walk, vec![Prepared, Stopped]);
    }

    #[test]
    fn test_ordering_matches_line() {
        assert!(Stopped < Prepared);
        assert!(Prepared < Playing);
    }

    #[test]
    fn test_transition_callback_names() {
        let t = Transition {
            from: Stopped,
            to: Prepared,
        };
        assert_eq!(t.callback_name(), "handle_stopped_to_prepared");
        let t = Transition {
            from: Playing,
            to: Prepared,
        };
        assert_eq!(t.callback_name(), "handle_playing_to_prepared");
    }
}
