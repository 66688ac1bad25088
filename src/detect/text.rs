use once_cell::sync::Lazy;
use regex::Regex;

use super::page::Page;
use super::types::{Candidate, McqSource};
use super::{strip_question_prefix, PageInspector};

/// Lines at or beyond this length are prose, not quiz content.
const MAX_LINE_CHARS: usize = 500;
/// How many lines after a question are examined for options.
const LOOKAHEAD: usize = 6;
/// Unmarked follow-on options must be at most this many words.
const MAX_PLAIN_OPTION_WORDS: usize = 10;
const OPTION_COUNT: std::ops::RangeInclusive<usize> = 2..=6;

static QUESTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:Q(?:uestion)?\s*\d+[:.\-]?\s*|\d+\.\s+)").expect("valid regex"));

static OPTION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-D]\)|[A-D]\.|\([A-D]\)|[A-D]\s-|[A-D]\s)").expect("valid regex")
});

static MARKER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\([A-D]\)|[A-D]\s*[).\-]?)\s*").expect("valid regex"));

/// Matches question lines followed by lettered option lines.
pub struct TextPatterns;

impl PageInspector for TextPatterns {
    fn name(&self) -> &'static str {
        "text-heuristic"
    }

    fn inspect(&self, page: &Page) -> Vec<Candidate> {
        let lines: Vec<String> = page
            .visible_lines()
            .into_iter()
            .filter(|l| l.chars().count() < MAX_LINE_CHARS)
            .collect();
        scan_lines(&lines)
    }
}

pub fn scan_lines(lines: &[String]) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !is_question_line(line) {
            continue;
        }
        let options = collect_options(&lines[i + 1..]);
        if OPTION_COUNT.contains(&options.len()) {
            candidates.push(Candidate {
                question: strip_question_prefix(line),
                options,
                source: McqSource::TextHeuristic,
                anchor: None,
            });
        }
    }
    candidates
}

fn is_question_line(line: &str) -> bool {
    QUESTION_LINE.is_match(line) || line.ends_with('?')
}

/// Marked lines are always options; once one is found, short unmarked lines
/// continue the run. The first line that is neither ends it.
fn collect_options(following: &[String]) -> Vec<String> {
    let mut options = Vec::new();
    for line in following.iter().take(LOOKAHEAD) {
        if OPTION_MARKER.is_match(line) {
            let stripped = MARKER_PREFIX.replace(line, "");
            let stripped = stripped.trim();
            if !stripped.is_empty() {
                options.push(stripped.to_string());
            }
        } else if !options.is_empty()
            && line.split_whitespace().count() <= MAX_PLAIN_OPTION_WORDS
        {
            options.push(line.clone());
        } else {
            break;
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_numbered_question_with_lettered_options() {
        let found = scan_lines(&lines(&["2. What is 2+2?", "A) 3", "B) 4", "C) 5"]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question, "What is 2+2?");
        assert_eq!(found[0].options, vec!["3", "4", "5"]);
        assert_eq!(found[0].source, McqSource::TextHeuristic);
    }

    #[test]
    fn test_marker_styles_are_stripped() {
        let found = scan_lines(&lines(&[
            "Question 7: Pick a colour",
            "(A) Red",
            "B. Green",
            "C - Blue",
            "D Yellow",
        ]));
        assert_eq!(found[0].question, "Pick a colour");
        assert_eq!(found[0].options, vec!["Red", "Green", "Blue", "Yellow"]);
    }

    #[test]
    fn test_plain_lines_continue_after_first_marker() {
        let found = scan_lines(&lines(&[
            "Which is a mammal?",
            "A) Whale",
            "Shark",
            "Trout",
            "This sentence is clearly far too long to be an answer option for anything",
            "Salmon",
        ]));
        assert_eq!(found[0].options, vec!["Whale", "Shark", "Trout"]);
    }

    #[test]
    fn test_unmarked_first_line_stops_scan() {
        let found = scan_lines(&lines(&["Is this a question?", "Berlin", "A) Paris", "B) Rome"]));
        assert!(found.is_empty());
    }

    #[test]
    fn test_option_count_bounds() {
        let one = scan_lines(&lines(&[
            "Q1. Only one?",
            "A) lonely",
            "this line has many more than ten words so it cannot be an option at all",
        ]));
        assert!(one.is_empty());

        // Seven option lines: only six are examined, so no seven-option MCQ.
        let seven = scan_lines(&lines(&[
            "Q2. Seven?", "A) a", "B) b", "C) c", "D) d", "e", "f", "g",
        ]));
        assert_eq!(seven.len(), 1);
        assert_eq!(seven[0].options, vec!["a", "b", "c", "d", "e", "f"]);
        assert!(!OPTION_COUNT.contains(&7));
        assert!(!OPTION_COUNT.contains(&1));
    }

    #[test]
    fn test_lowercase_q_is_not_numbering() {
        assert!(!is_question_line("q1 something"));
        assert!(is_question_line("Q1 something"));
        assert!(is_question_line("12. Something"));
        assert!(!is_question_line("12.5 percent"));
    }

    #[test]
    fn test_inspects_rendered_page() {
        let page = Page::parse(
            "<h2>1. What is the capital of France?</h2>\
             <ul><li>A) Berlin</li><li>B) Paris</li><li>C) London</li><li>D) Madrid</li></ul>",
        );
        let found = TextPatterns.inspect(&page);
        assert_eq!(found[0].question, "What is the capital of France?");
        assert_eq!(found[0].options, vec!["Berlin", "Paris", "London", "Madrid"]);
    }
}
