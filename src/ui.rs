//! Presentation state owned by the controller: theme and which turn, if
//! any, is being read aloud. Speech synthesis itself is not done here.

use colored::*;
use serde::{Deserialize, Serialize};

use crate::conversation::TurnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    /// Role label above a message ("You", "Gemini").
    pub fn label(&self, text: &str) -> ColoredString {
        match self {
            Theme::Dark => text.bright_blue().bold(),
            Theme::Light => text.blue().bold(),
        }
    }

    pub fn assistant(&self, text: &str) -> ColoredString {
        match self {
            Theme::Dark => text.bright_white(),
            Theme::Light => text.black(),
        }
    }

    pub fn error(&self, text: &str) -> ColoredString {
        match self {
            Theme::Dark => text.bright_red(),
            Theme::Light => text.red(),
        }
    }

    pub fn dim(&self, text: &str) -> ColoredString {
        text.dimmed().italic()
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Dark => write!(f, "dark"),
            Theme::Light => write!(f, "light"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub theme: Theme,
    pub voice_enabled: bool,
    speaking: Option<TurnId>,
}

impl UiState {
    pub fn new(theme: Theme, voice_enabled: bool) -> Self {
        UiState { theme, voice_enabled, speaking: None }
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn speaking(&self) -> Option<TurnId> {
        self.speaking
    }

    /// Start reading `turn` aloud, or stop if it is already playing.
    /// Returns false when voice playback is disabled.
    pub fn toggle_speech(&mut self, turn: TurnId) -> bool {
        if !self.voice_enabled {
            return false;
        }
        self.speaking = if self.speaking == Some(turn) { None } else { Some(turn) };
        true
    }

    pub fn reset_speech(&mut self) {
        self.speaking = None;
    }
}
