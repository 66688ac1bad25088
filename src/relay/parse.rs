use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::types::Answer;

/// Standalone uppercase A-D. Lowercase "a" is too often an article.
static LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-D])\b").expect("valid regex"));

/// The JSON shape the prompt asks for. Every field is optional in practice.
#[derive(Debug, Default, Deserialize)]
struct Structured {
    #[serde(default)]
    choice: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Turn raw model output into an [`Answer`]: structured JSON first, then a
/// letter scan over the raw text. Never fails.
pub fn parse_model_text(raw: &str) -> Answer {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Answer {
            choice: None,
            text: String::new(),
            short: None,
            failed: false,
        };
    }

    if let Some((parsed, source)) = parse_structured(trimmed) {
        let choice = parsed.choice.filter(|c| !c.trim().is_empty());
        let text = parsed.text.filter(|t| !t.trim().is_empty());
        if choice.is_some() || text.is_some() {
            let text = text.unwrap_or_else(|| match (&choice, &parsed.explanation) {
                (Some(c), Some(e)) if !e.is_empty() => format!("{} - {}", c, e),
                _ => source.to_string(),
            });
            return Answer {
                short: choice.clone(),
                choice,
                text,
                failed: false,
            };
        }
    }

    let letter = LETTER
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Answer {
        short: letter.clone(),
        choice: letter,
        text: trimmed.to_string(),
        failed: false,
    }
}

/// Strict JSON, then JSON inside a Markdown fence, then the outermost
/// `{...}` embedded in prose.
fn parse_structured(text: &str) -> Option<(Structured, &str)> {
    let candidates = [Some(text), strip_fence(text), embedded_object(text)];
    candidates
        .into_iter()
        .flatten()
        .find_map(|c| serde_json::from_str::<Structured>(c).ok().map(|s| (s, c)))
}

fn strip_fence(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("```")?.strip_suffix("```")?;
    // Drop the info string ("json") on the opening line.
    let body = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or(inner);
    Some(body.trim())
}

fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
