//! Player-facing feedback.
//!
//! The match core decides *what* to tell players; how a notice is
//! rendered (chat line, screen title, sound) is up to the host.

use serde::{Deserialize, Serialize};

/// A sound or visual cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    CountdownTick,
    CountdownUrgent,
    RoundStart,
    ZoneShrink,
    Hazard,
    Airdrop,
    Elimination,
    Victory,
}

/// Something to show to one or more players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A plain chat line.
    Chat { text: String },
    /// A large on-screen title.
    Title { title: String, subtitle: String },
    /// A short status line above the hotbar.
    ActionBar { text: String },
    /// A sound or effect with no text.
    Cue { cue: Cue },
}

impl Notice {
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Chat { text: text.into() }
    }

    pub fn title(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self::Title {
            title: title.into(),
            subtitle: subtitle.into(),
        }
    }

    pub fn action_bar(text: impl Into<String>) -> Self {
        Self::ActionBar { text: text.into() }
    }

    pub fn cue(cue: Cue) -> Self {
        Self::Cue { cue }
    }

    /// The text carried by this notice, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Chat { text } | Self::ActionBar { text } => Some(text),
            Self::Title { title, .. } => Some(title),
            Self::Cue { .. } => None,
        }
    }
}
