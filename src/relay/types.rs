use serde::{Deserialize, Serialize};

use crate::detect::types::Mcq;

/// A suggested answer for one MCQ. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Single letter label, e.g. "B".
    pub choice: Option<String>,
    /// Full response text, or a description of what went wrong.
    pub text: String,
    /// Short display label; falls back to `choice`.
    #[serde(default)]
    pub short: Option<String>,
    /// Set on sentinel answers produced instead of a model reply.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl Answer {
    /// Sentinel used when no model reply could be obtained.
    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            choice: None,
            text: text.into(),
            short: None,
            failed: true,
        }
    }

    /// What an overlay shows: the short label, else the text.
    pub fn display(&self) -> &str {
        self.short
            .as_deref()
            .or(self.choice.as_deref())
            .filter(|s| !s.is_empty())
            .or(Some(self.text.as_str()).filter(|s| !s.is_empty()))
            .unwrap_or("No answer")
    }
}

/// Messages exchanged between a page session (or native-messaging peer)
/// and the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    McqDetected { mcq: Mcq },
    McqAnswer { mcq: Mcq, answer: Answer },
}
