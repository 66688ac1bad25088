use crate::detect::types::Mcq;

const INSTRUCTIONS: &str = "You are an assistant specialized in answering multiple-choice questions.";
const TASK: &str =
    "Task: Select the best answer (single letter) and a short explanation (one sentence).";
const FORMAT: &str =
    r#"Format: {"choice":"<LETTER>","explanation":"<one sentence>","text":"<full answer text>"}"#;

/// Option label for position `index`: A, B, C...
pub fn letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

pub fn build_prompt(mcq: &Mcq) -> String {
    let mut lines = vec![
        INSTRUCTIONS.to_string(),
        format!("Question: {}", mcq.question),
        "Options:".to_string(),
    ];
    lines.extend(
        mcq.options
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{}) {}", letter(i), o)),
    );
    lines.push(TASK.to_string());
    lines.push(FORMAT.to_string());
    lines.join("\n")
}
