use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose contents never render as text.
const HIDDEN: &[&str] = &["script", "style", "noscript", "template", "head", "title"];

/// Elements that start and end on their own line when rendered.
const BLOCK: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "legend", "li", "main", "nav", "ol", "p", "pre", "section", "summary",
    "table", "tr", "ul",
    // Cells break lines too, so options laid out across a row stay apart.
    "caption", "td", "th",
];

/// A parsed HTML page. Not `Send`: build it, inspect it, drop it.
pub struct Page {
    document: Html,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    /// `<body>` if present, else the root element.
    pub fn body(&self) -> ElementRef<'_> {
        Selector::parse("body")
            .ok()
            .and_then(|sel| self.document.select(&sel).next())
            .unwrap_or_else(|| self.document.root_element())
    }

    /// Rendered text of the page body split into trimmed, non-empty lines.
    pub fn visible_lines(&self) -> Vec<String> {
        inner_text(self.body())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Approximates `innerText`: block elements and `<br>` break lines, runs of
/// whitespace collapse, hidden elements are skipped. Lines are trimmed and
/// blank lines dropped.
pub fn inner_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect(element, &mut raw);
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if HIDDEN.contains(&name) {
        return;
    }
    if name == "br" {
        out.push('\n');
        return;
    }

    let block = BLOCK.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_collapsed(out, &text.text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect(child, out);
                }
            }
            _ => {}
        }
    }
    if block {
        out.push('\n');
    }
}

fn push_collapsed(out: &mut String, text: &str) {
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !matches!(out.chars().next_back(), None | Some(' ') | Some('\n')) {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
}
