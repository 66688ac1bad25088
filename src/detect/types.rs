use serde::{Deserialize, Serialize};

/// Fingerprint of `question|option|option...`.
pub type McqId = String;

/// Which detection strategy produced a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum McqSource {
    /// Grouped exclusive-choice (radio) controls.
    Structured,
    /// Question/option line patterns in the visible text.
    TextHeuristic,
}

/// A detected multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mcq {
    pub id: McqId,
    pub question: String,
    /// 2 to 8 non-empty entries, in page order.
    pub options: Vec<String>,
    pub source: McqSource,
    /// Selector-like pointer to where the question lives on the page,
    /// e.g. `input[name="q1"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

/// Raw output of a single inspector, before normalization and dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub question: String,
    pub options: Vec<String>,
    pub source: McqSource,
    pub anchor: Option<String>,
}
