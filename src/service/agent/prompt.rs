//! Prompt assembly.

use crate::{
    base::prompts::RAG_RESPONSE_DIRECTIVE,
    service::{llm::Turn, rag::RetrievedContext},
};

/// Put retrieved knowledge base articles ahead of the original instructions.
///
/// With no retrieved context the instructions are returned unchanged.
pub fn enhance_system_content(system_content: &str, context: &RetrievedContext) -> String {
    if context.is_empty() {
        return system_content.to_string();
    }

    format!(
        "## Retrieved Knowledge Base Articles\n\nThe following knowledge base articles may be relevant to the user's query:\n\n{}\n\n## Instructions\n\n{}\n{}",
        context.context(),
        system_content.trim(),
        RAG_RESPONSE_DIRECTIVE
    )
}

/// The opening user turn: the prompt, followed by the prior conversation when there is one.
pub fn seed_turn(prompt: &str, conversation_history: &str) -> Turn {
    if conversation_history.trim().is_empty() {
        return Turn::user_text(prompt);
    }

    Turn::user_text(format!("Prompt: {prompt}\nContext: {}", conversation_history.trim_end()))
}

// Tests.
