pub mod page;
pub mod structured;
pub mod text;
pub mod types;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::hash::fingerprint;
use page::Page;
use structured::StructuredControls;
use text::TextPatterns;
use types::{Candidate, Mcq};

/// Valid option counts for any detected question.
const OPTION_RANGE: std::ops::RangeInclusive<usize> = 2..=8;

static NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s*").expect("valid regex"));
static LABEL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Q(?:uestion)?\s*\d+\s*[:.\-]?\s*").expect("valid regex"));

/// One way of finding question/option groups on a page.
pub trait PageInspector: Send + Sync {
    fn name(&self) -> &'static str;
    fn inspect(&self, page: &Page) -> Vec<Candidate>;
}

/// Drop `1.`, `Q3:` or `Question 3 -` style numbering from a question.
pub fn strip_question_prefix(question: &str) -> String {
    let q = NUMBER_PREFIX.replace(question.trim(), "");
    let q = LABEL_PREFIX.replace(&q, "");
    q.trim().to_string()
}

/// Runs every inspector over a page and merges their results.
pub struct Detector {
    inspectors: Vec<Box<dyn PageInspector>>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(vec![Box::new(StructuredControls), Box::new(TextPatterns)])
    }
}

impl Detector {
    pub fn new(inspectors: Vec<Box<dyn PageInspector>>) -> Self {
        Self { inspectors }
    }

    /// Detect MCQs in an HTML document. Never fails; unusable groups are
    /// left out.
    pub fn detect(&self, html: &str) -> Vec<Mcq> {
        let page = Page::parse(html);
        self.detect_page(&page)
    }

    pub fn detect_page(&self, page: &Page) -> Vec<Mcq> {
        let mut candidates = Vec::new();
        for inspector in &self.inspectors {
            let found = inspector.inspect(page);
            debug!(inspector = inspector.name(), count = found.len(), "inspected page");
            candidates.extend(found);
        }
        merge(candidates)
    }
}

/// Normalize, validate and dedupe by fingerprint, keeping the first
/// occurrence in discovery order.
pub fn merge(candidates: Vec<Candidate>) -> Vec<Mcq> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for candidate in candidates {
        let question = candidate.question.trim().to_string();
        let options: Vec<String> = candidate
            .options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        if question.chars().count() <= 3 || !OPTION_RANGE.contains(&options.len()) {
            continue;
        }

        let id = fingerprint(&format!("{}|{}", question, options.join("|")));
        if !seen.insert(id.clone()) {
            continue;
        }
        out.push(Mcq {
            id,
            question,
            options,
            source: candidate.source,
            anchor: candidate.anchor,
        });
    }
    out
}
