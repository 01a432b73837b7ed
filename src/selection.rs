use parking_lot::RwLock;

use crate::domain::Language;
use crate::error::Result;

/// the language a browser picked and a device has yet to pick up
///
/// single cell, last write wins, no history.
#[derive(Debug, Default)]
pub struct SelectionState {
    current: RwLock<Option<Language>>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// validate `code` and make it the current selection
    pub fn select(&self, code: &str) -> Result<Language> {
        let lang: Language = code.parse()?;
        *self.current.write() = Some(lang);
        tracing::info!("[SELECTION] language set to {}", lang);
        Ok(lang)
    }

    pub fn current(&self) -> Option<Language> {
        *self.current.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;

    #[test]
    fn starts_unset() {
        assert_eq!(SelectionState::new().current(), None);
    }

    #[test]
    fn last_write_wins() {
        let state = SelectionState::new();
        assert_eq!(state.select("en").unwrap(), Language::English);
        assert_eq!(state.current(), Some(Language::English));
        state.select("sw").unwrap();
        assert_eq!(state.current(), Some(Language::Swahili));
        assert_eq!(state.current(), Some(Language::Swahili));
    }

    #[test]
    fn unsupported_code_leaves_state_alone() {
        let state = SelectionState::new();
        state.select("ha").unwrap();
        assert_eq!(state.select("fr"), Err(GatewayError::validation("Invalid language")));
        assert_eq!(state.current(), Some(Language::Hausa));
    }
}
