use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle of a link.
///
/// `Stopped → Running` on start, `Running → Halting` on a halt request or a
/// fatal fault, `Halting → Stopped` once the loop has released its sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Stopped,
    Running,
    Halting,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Stopped => "stopped",
            LinkState::Running => "running",
            LinkState::Halting => "halting",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LinkState::Running,
            2 => LinkState::Halting,
            _ => LinkState::Stopped,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free holder for a [`LinkState`] shared between owner and loop.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move `from → to`; returns false if the state was something else.
    pub(crate) fn transition(&self, from: LinkState, to: LinkState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_only_from_expected_state() {
        let cell = StateCell::new(LinkState::Stopped);
        assert!(!cell.transition(LinkState::Running, LinkState::Halting));
        assert_eq!(cell.get(), LinkState::Stopped);

        cell.set(LinkState::Running);
        assert!(cell.transition(LinkState::Running, LinkState::Halting));
        assert_eq!(cell.get(), LinkState::Halting);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&LinkState::Halting).unwrap();
        assert_eq!(json, "\"halting\"");
        assert_eq!(LinkState::Running.to_string(), "running");
    }
}
