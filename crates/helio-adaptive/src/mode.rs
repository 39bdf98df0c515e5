//! Adaptive mode state machine

use helio_config::AdaptiveMode;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeState {
    mode: AdaptiveMode,
    /// Mode restored by `enable(None)`
    last_mode: AdaptiveMode,
    /// Manual because the lid was closed, not because the user chose it
    clamshell: bool,
}

impl Default for ModeState {
    fn default() -> Self {
        Self::new(AdaptiveMode::default())
    }
}

impl ModeState {
    pub fn new(mode: AdaptiveMode) -> Self {
        let last_mode = match mode {
            AdaptiveMode::Manual => AdaptiveMode::Location,
            other => other,
        };
        Self {
            mode,
            last_mode,
            clamshell: false,
        }
    }

    pub fn mode(&self) -> AdaptiveMode {
        self.mode
    }

    pub fn last_mode(&self) -> AdaptiveMode {
        self.last_mode
    }

    pub fn in_clamshell(&self) -> bool {
        self.clamshell
    }

    /// Cycle location, sync, manual
    ///
    /// Sync is skipped when there is no reference display to follow or its
    /// lid is closed.
    pub fn toggle(&mut self, reference_available: bool, lid_closed: bool) -> AdaptiveMode {
        let next = match self.mode {
            AdaptiveMode::Location if reference_available && !lid_closed => AdaptiveMode::Sync,
            AdaptiveMode::Location => AdaptiveMode::Manual,
            AdaptiveMode::Sync => AdaptiveMode::Manual,
            AdaptiveMode::Manual => AdaptiveMode::Location,
        };
        self.set(next);
        next
    }

    /// Select a mode directly
    pub fn set(&mut self, mode: AdaptiveMode) {
        if mode == AdaptiveMode::Manual && self.mode != AdaptiveMode::Manual {
            self.last_mode = self.mode;
        }
        self.mode = mode;
        self.clamshell = false;
    }

    /// Switch to manual, remembering the adaptive mode
    pub fn disable(&mut self) {
        if self.mode != AdaptiveMode::Manual {
            self.last_mode = self.mode;
            self.mode = AdaptiveMode::Manual;
        }
    }

    /// Switch to `mode`, or back to the remembered one
    pub fn enable(&mut self, mode: Option<AdaptiveMode>) {
        self.mode = mode.unwrap_or(self.last_mode);
    }

    /// React to the lid; returns true if the mode changed
    pub fn on_lid(&mut self, closed: bool) -> bool {
        if closed {
            if self.mode != AdaptiveMode::Manual {
                tracing::info!("Lid closed, pausing {} mode", self.mode);
                self.clamshell = true;
                self.disable();
                return true;
            }
        } else if self.clamshell {
            self.clamshell = false;
            if self.mode == AdaptiveMode::Manual {
                self.enable(None);
                tracing::info!("Lid opened, resuming {} mode", self.mode);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_cycle() {
        let mut state = ModeState::new(AdaptiveMode::Location);
        assert_eq!(state.toggle(true, false), AdaptiveMode::Sync);
        assert_eq!(state.toggle(true, false), AdaptiveMode::Manual);
        assert_eq!(state.toggle(true, false), AdaptiveMode::Location);
    }

    #[test]
    fn test_toggle_skips_sync_without_reference() {
        let mut state = ModeState::new(AdaptiveMode::Location);
        assert_eq!(state.toggle(false, false), AdaptiveMode::Manual);

        let mut state = ModeState::new(AdaptiveMode::Location);
        assert_eq!(state.toggle(true, true), AdaptiveMode::Manual);
    }

    #[test]
    fn test_disable_enable_restores() {
        let mut state = ModeState::new(AdaptiveMode::Sync);
        state.disable();
        assert_eq!(state.mode(), AdaptiveMode::Manual);
        state.disable();
        state.enable(None);
        assert_eq!(state.mode(), AdaptiveMode::Sync);

        state.enable(Some(AdaptiveMode::Location));
        assert_eq!(state.mode(), AdaptiveMode::Location);
    }

    #[test]
    fn test_clamshell() {
        let mut state = ModeState::new(AdaptiveMode::Sync);
        assert!(state.on_lid(true));
        assert_eq!(state.mode(), AdaptiveMode::Manual);
        assert!(state.in_clamshell());
        assert!(!state.on_lid(true));

        assert!(state.on_lid(false));
        assert_eq!(state.mode(), AdaptiveMode::Sync);
        assert!(!state.in_clamshell());
    }

    #[test]
    fn test_lid_open_keeps_user_manual() {
        let mut state = ModeState::new(AdaptiveMode::Manual);
        assert!(!state.on_lid(true));
        assert!(!state.on_lid(false));
        assert_eq!(state.mode(), AdaptiveMode::Manual);
    }

    #[test]
    fn test_user_choice_ends_clamshell() {
        let mut state = ModeState::new(AdaptiveMode::Location);
        state.on_lid(true);
        state.set(AdaptiveMode::Manual);
        assert!(!state.on_lid(false));
        assert_eq!(state.mode(), AdaptiveMode::Manual);
    }
}
