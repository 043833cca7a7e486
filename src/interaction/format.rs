//! Block Kit formatting for bot replies.
//!
//! Every function returns Block Kit JSON; the chat client converts it for the wire.

use serde_json::{Value, json};

use crate::base::types::RagSource;

/// Slack's limit on the text of a single section block.
pub const MAX_SECTION_CHARS: usize = 3000;

/// Limit applied to notification fallback text.
pub const MAX_FALLBACK_CHARS: usize = 3000;

// Types.

/// Flavor of a general response, used to pick the header emoji.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    General,
    DirectMessage,
    Error,
}

impl ResponseKind {
    fn emoji(self) -> &'static str {
        match self {
            Self::General => ":robot_face:",
            Self::DirectMessage => ":speech_balloon:",
            Self::Error => ":warning:",
        }
    }
}

// Text helpers.

/// Shorten `text` to at most `max_chars` bytes, preferring a sentence end, then a word boundary.
///
/// Returns the (trimmed) text and whether it was shortened.
pub fn shorten_response(text: &str, max_chars: usize) -> (String, bool) {
    if text.len() <= max_chars {
        return (text.to_string(), false);
    }

    let limit = floor_char_boundary(text, max_chars);
    let head = &text[..limit];

    let end = head.rfind(". ").or_else(|| head.rfind(' ')).map_or(limit, |i| i + 1);

    (text[..end].trim().to_string(), true)
}

/// Split `text` into pieces of at most `max_chars` bytes.
///
/// Breaks at the last paragraph, then newline, then sentence end, then word
/// boundary inside each window, and hard-breaks when none is found.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut position = 0;

    while position < text.len() {
        let mut end = floor_char_boundary(text, (position + max_chars).min(text.len()));

        if end <= position {
            end = ceil_char_boundary(text, position + 1);
        }

        let break_point = if end < text.len() {
            let window = &text[position..end];

            ["\n\n", "\n", ". ", " "]
                .iter()
                .find_map(|separator| window.rfind(separator).filter(|&i| i > 0))
                .map_or(end, |i| position + i + 1)
        } else {
            end
        };

        let chunk = text[position..break_point].trim();

        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        position = break_point;
    }

    chunks
}

/// `Q: {prompt}\nA: {response}`, cut to [`MAX_FALLBACK_CHARS`].
pub fn fallback_text(prompt: &str, response: &str) -> String {
    truncate_fallback(&format!("Q: {prompt}\nA: {response}"))
}

/// Cut notification text to [`MAX_FALLBACK_CHARS`], ending with `...` when cut.
pub fn truncate_fallback(text: &str) -> String {
    if text.len() <= MAX_FALLBACK_CHARS {
        return text.to_string();
    }

    let end = floor_char_boundary(text, MAX_FALLBACK_CHARS - 3);

    format!("{}...", &text[..end])
}

/// Human-friendly document name: no extension, no leading numeric id, spaces for underscores.
pub fn clean_source_name(filename: &str) -> String {
    let stem = filename.strip_suffix(".md").unwrap_or(filename);

    let stem = match stem.split_once('_') {
        Some((prefix, rest)) if !prefix.is_empty() && !rest.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => stem,
    };

    stem.replace('_', " ")
}

// Blocks.

/// The user's prompt as a quote.
pub fn prompt_quote_block(prompt: &str) -> Value {
    json!({
        "type": "rich_text",
        "elements": [{
            "type": "rich_text_quote",
            "elements": [{ "type": "text", "text": prompt }]
        }]
    })
}

/// Knowledge base citations; empty when there are no sources.
pub fn format_rag_sources(sources: &[RagSource]) -> Vec<Value> {
    if sources.is_empty() {
        return Vec::new();
    }

    let items = sources
        .iter()
        .map(|source| {
            let name = clean_source_name(&source.filename);

            match &source.url {
                Some(url) => format!("• <{url}|{name}>"),
                None => format!("• {name}"),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        json!({ "type": "divider" }),
        context_block(&format!(":page_facing_up: *Referenced Knowledge Base Articles*\n{items}")),
    ]
}

/// A response grounded in knowledge base articles, followed by its citations.
pub fn format_rag_response(response: &str, sources: &[RagSource]) -> Vec<Value> {
    let mut blocks = vec![header_block(":books: Knowledge Base Resolution")];

    let (text, shortened) = shorten_response(response, MAX_SECTION_CHARS);
    blocks.extend(section_blocks(&text));

    if shortened {
        blocks.push(context_block("_Response was shortened. Ask for more details if needed!_ :mag:"));
    }

    blocks.extend(format_rag_sources(sources));

    blocks
}

/// A general response.
pub fn format_ai_response(response: &str, kind: ResponseKind) -> Vec<Value> {
    let mut blocks = vec![header_block(&format!("{} Bolty's Response", kind.emoji()))];

    let (text, shortened) = shorten_response(response, MAX_SECTION_CHARS);
    blocks.extend(section_blocks(&text));

    if shortened {
        blocks.push(context_block("_Response shortened. Ask for more details!_ :mag:"));
    }

    blocks
}

/// A code analysis response.
///
/// Code answers are not shortened since file paths and snippets tend to sit at the end.
pub fn format_code_response(response: &str) -> Vec<Value> {
    let mut blocks = vec![header_block(":computer: Code Analysis")];

    blocks.extend(section_blocks(response));
    blocks.push(context_block("_Analyzed with MCP tools. Ask a follow-up for more detail!_ :mag:"));

    blocks
}

/// An error, shown as preformatted text.
pub fn format_error_message(error: &str) -> Vec<Value> {
    let (error, _) = shorten_response(error, MAX_SECTION_CHARS - 6);

    vec![
        header_block(":warning: Oops! Something went wrong"),
        mrkdwn_section(&format!("```{error}```")),
        context_block("_Try again or rephrase your question!_ :arrows_counterclockwise:"),
    ]
}

/// A single section, optionally prefixed with an emoji.
pub fn format_simple_message(text: &str, emoji: Option<&str>) -> Vec<Value> {
    let text = match emoji {
        Some(emoji) => format!("{emoji} {text}"),
        None => text.to_string(),
    };

    vec![mrkdwn_section(&text)]
}

// Helpers.

fn header_block(text: &str) -> Value {
    json!({
        "type": "header",
        "text": { "type": "plain_text", "text": text, "emoji": true }
    })
}

fn mrkdwn_section(text: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    })
}

fn context_block(text: &str) -> Value {
    json!({
        "type": "context",
        "elements": [{ "type": "mrkdwn", "text": text }]
    })
}

fn section_blocks(text: &str) -> Vec<Value> {
    split_into_chunks(text, MAX_SECTION_CHARS).iter().map(|chunk| mrkdwn_section(chunk)).collect()
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }

    while !text.is_char_boundary(index) {
        index -= 1;
    }

    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }

    index.min(text.len())
}

// Tests.
