//! Dialogue history types

use serde::{Deserialize, Serialize};

/// Who said a dialogue turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueRole {
    User,
    Assistant,
}

/// One entry in the dialogue history handed to the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: DialogueRole,
    pub text: String,
}

impl DialogueTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: DialogueRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: DialogueRole::Assistant,
            text: text.into(),
        }
    }
}
