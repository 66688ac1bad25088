use std::collections::HashMap;

use scraper::{ElementRef, Selector};
use tracing::debug;

use super::page::{inner_text, Page};
use super::types::{Candidate, McqSource};
use super::{strip_question_prefix, PageInspector};

/// Radio groups outside this size are not treated as questions.
const GROUP_SIZE: std::ops::RangeInclusive<usize> = 2..=8;

/// Classes that mark an element as a question container.
const CONTAINER_CLASSES: &[&str] = &["question", "quiz", "q-block"];
const CONTAINER_TAGS: &[&str] = &["form", "fieldset", "article"];

/// Finds radio groups and resolves their labels and enclosing question.
pub struct StructuredControls;

struct Member<'a> {
    control: ElementRef<'a>,
    label: String,
}

impl PageInspector for StructuredControls {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn inspect(&self, page: &Page) -> Vec<Candidate> {
        let Ok(inputs) = Selector::parse("input") else {
            return vec![];
        };
        let labels_by_id = labels_by_target(page);

        // Group by `name`, in order of first appearance.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Member<'_>>> = HashMap::new();
        for control in page.document().select(&inputs) {
            let el = control.value();
            let is_radio = el
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("radio"));
            let Some(name) = el.attr("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            if !is_radio {
                continue;
            }
            let label = resolve_label(control, &labels_by_id);
            groups
                .entry(name.to_string())
                .or_insert_with(|| {
                    order.push(name.to_string());
                    Vec::new()
                })
                .push(Member { control, label });
        }

        let mut candidates = Vec::new();
        for name in order {
            let Some(members) = groups.remove(&name) else {
                continue;
            };
            if !GROUP_SIZE.contains(&members.len()) {
                debug!(group = %name, size = members.len(), "radio group size out of range");
                continue;
            }
            let first = members[0].control;
            let question = find_question(first)
                .or_else(|| container_first_line(page, first))
                .map(|q| strip_question_prefix(&q))
                .unwrap_or_default();
            let options = members
                .into_iter()
                .map(|m| m.label)
                .filter(|l| !l.is_empty())
                .collect();

            candidates.push(Candidate {
                question,
                options,
                source: McqSource::Structured,
                anchor: Some(format!("input[name=\"{}\"]", name)),
            });
        }
        candidates
    }
}

/// `label[for]` text keyed by target id; first label wins.
fn labels_by_target(page: &Page) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(sel) = Selector::parse("label[for]") else {
        return map;
    };
    for label in page.document().select(&sel) {
        if let Some(target) = label.value().attr("for") {
            map.entry(target.to_string())
                .or_insert_with(|| inner_text(label));
        }
    }
    map
}

/// Explicit `for=` label, then a wrapping `<label>`, then trailing text.
fn resolve_label(control: ElementRef<'_>, labels_by_id: &HashMap<String, String>) -> String {
    if let Some(text) = control
        .value()
        .id()
        .and_then(|id| labels_by_id.get(id))
        .filter(|t| !t.is_empty())
    {
        return text.clone();
    }

    if let Some(label) = control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "label")
    {
        let text = inner_text(label);
        if !text.is_empty() {
            return text;
        }
    }

    control
        .next_sibling()
        .and_then(|n| n.value().as_text().map(|t| t.text.trim().to_string()))
        .unwrap_or_default()
}

/// A text block that reads like a question prompt rather than a paragraph.
fn is_question_block(text: &str) -> bool {
    let len = text.chars().count();
    len > 5 && len <= 400 && text.split_whitespace().count() < 60
}

/// Walk up the control's ancestors; at each level check preceding siblings,
/// nearest first. The control's own siblings are usually its label.
fn find_question(control: ElementRef<'_>) -> Option<String> {
    let mut level = control.parent().and_then(ElementRef::wrap);
    while let Some(el) = level {
        for prev in el.prev_siblings().filter_map(ElementRef::wrap) {
            let text = inner_text(prev);
            if is_question_block(&text) {
                return Some(text);
            }
        }
        level = el.parent().and_then(ElementRef::wrap);
    }
    None
}

fn is_container(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    CONTAINER_TAGS.contains(&value.name())
        || value.classes().any(|c| CONTAINER_CLASSES.contains(&c))
}

fn container_first_line(page: &Page, control: ElementRef<'_>) -> Option<String> {
    let container = control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(is_container)
        .unwrap_or_else(|| page.body());
    inner_text(container).lines().next().map(str::to_string)
}
