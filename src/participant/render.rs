//! Deterministic markup for transcript content and prompts

use super::parse::Answer;
use crate::state_machine::{Message, Participant};
use std::fmt::Write;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Document wrapper for the cached system block
pub fn document_block(text: &str) -> String {
    format!("<Document>\n{text}\n</Document>")
}

/// `<Questions>` with one `<Question>` per prompt
pub fn questions_block<S: AsRef<str>>(prompts: &[S]) -> String {
    let mut out = String::from("<Questions>\n");
    for prompt in prompts {
        let _ = writeln!(out, "<Question>{}</Question>", escape(prompt.as_ref()));
    }
    out.push_str("</Questions>");
    out
}

/// `<Responses>` with one `<ResponseItem>` per answer
pub fn responses_block(answers: &[Answer]) -> String {
    let mut out = String::from("<Responses>\n");
    for a in answers {
        let _ = write!(
            out,
            "<ResponseItem>\n<Question>{}</Question>\n<Response>{}</Response>\n</ResponseItem>\n",
            escape(&a.question),
            escape(&a.answer)
        );
    }
    out.push_str("</Responses>");
    out
}

/// History entries, each annotated with its turn and author
pub fn history_block(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let author = match m.author {
                Participant::Student => "Student",
                Participant::Teacher => "Teacher",
                Participant::Observer => "Observer",
            };
            format!(
                "<Response>\n<Turn>{}</Turn>\n<Responder>{author}</Responder>\n<ResponseContent>\n{}\n</ResponseContent>\n</Response>",
                m.turn, m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Accumulated insights in the order they were produced
pub fn insights_block(insights: &[String]) -> String {
    insights.join("\n\n")
}
