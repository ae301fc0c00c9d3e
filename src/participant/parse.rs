//! Strict parsing of structured collaborator output
//!
//! The only leniency is a single Markdown code fence around the payload.
//! Anything else that is not exactly the expected JSON shape is rejected.

use crate::state_machine::StructuredQuestion;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("expected a JSON array of {expected}: {detail}")]
    Malformed {
        expected: &'static str,
        detail: String,
    },
    #[error("response contained no {expected}")]
    Empty { expected: &'static str },
    #[error("item {index} has a blank {field}")]
    BlankField { index: usize, field: &'static str },
}

/// One question/answer pair from the Teacher
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Answer {
    pub question: String,
    pub answer: String,
}

/// Remove one surrounding code fence, with or without a language tag
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // The rest of the opening line is the language tag
    let Some((tag, body)) = after_open.split_once('\n') else {
        return trimmed;
    };
    if tag.trim().contains(char::is_whitespace) {
        return trimmed;
    }
    match body.trim_end().strip_suffix("```") {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}

fn parse_array<T: DeserializeOwned>(raw: &str, expected: &'static str) -> Result<Vec<T>, ParseFailure> {
    let items: Vec<T> = serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        ParseFailure::Malformed {
            expected,
            detail: e.to_string(),
        }
    })?;
    if items.is_empty() {
        return Err(ParseFailure::Empty { expected });
    }
    Ok(items)
}

fn require(value: &str, index: usize, field: &'static str) -> Result<(), ParseFailure> {
    if value.trim().is_empty() {
        Err(ParseFailure::BlankField { index, field })
    } else {
        Ok(())
    }
}

/// `[{"title", "prompt", "category"}, ...]`
pub fn parse_opening_batch(raw: &str) -> Result<Vec<StructuredQuestion>, ParseFailure> {
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Item {
        title: String,
        prompt: String,
        category: String,
    }

    let items: Vec<Item> = parse_array(raw, "question objects")?;
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            require(&item.title, index, "title")?;
            require(&item.prompt, index, "prompt")?;
            require(&item.category, index, "category")?;
            Ok(StructuredQuestion {
                title: item.title.trim().to_string(),
                prompt: item.prompt.trim().to_string(),
                category: item.category.trim().to_string(),
            })
        })
        .collect()
}

/// `["question", ...]`
pub fn parse_follow_up_batch(raw: &str) -> Result<Vec<String>, ParseFailure> {
    let items: Vec<String> = parse_array(raw, "question strings")?;
    items
        .into_iter()
        .enumerate()
        .map(|(index, q)| {
            require(&q, index, "question")?;
            Ok(q.trim().to_string())
        })
        .collect()
}

/// `[{"question", "answer"}, ...]`
pub fn parse_answers(raw: &str) -> Result<Vec<Answer>, ParseFailure> {
    let items: Vec<Answer> = parse_array(raw, "answer objects")?;
    for (index, item) in items.iter().enumerate() {
        require(&item.question, index, "question")?;
        require(&item.answer, index, "answer")?;
    }
    Ok(items)
}
