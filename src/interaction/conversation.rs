//! Conversation history rendering.

use crate::service::chat::ChatMessage;

/// Render `messages` as `<user>: <text>` lines, oldest first.
///
/// The triggering message (`exclude_ts`) and messages without text are skipped.
pub fn parse_conversation(messages: &[ChatMessage], exclude_ts: &str) -> String {
    messages
        .iter()
        .filter(|message| message.ts != exclude_ts && !message.text.trim().is_empty())
        .map(|message| format!("{}: {}", message.user, message.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove `<@bot_user_id>` mentions from `text`.
pub fn strip_mention(text: &str, bot_user_id: &str) -> String {
    text.replace(&format!("<@{bot_user_id}>"), "").trim().to_string()
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conversation() {
        let messages = vec![
            ChatMessage::new("1.0", "U1", "kafka backlog is at 9000"),
            ChatMessage::new("2.0", "B1", ""),
            ChatMessage::new("3.0", "U2", " is that bad? "),
            ChatMessage::new("4.0", "U1", "<@B0T> what do we do?"),
        ];

        assert_eq!(parse_conversation(&messages, "4.0"), "U1: kafka backlog is at 9000\nU2: is that bad?");
    }

    #[test]
    fn test_parse_empty_conversation() {
        assert_eq!(parse_conversation(&[], "1.0"), "");
        assert_eq!(parse_conversation(&[ChatMessage::new("1.0", "U1", "hi")], "1.0"), "");
    }

    #[test]
    fn test_strip_mention() {
        assert_eq!(strip_mention("<@B0T> why is kafka slow?", "B0T"), "why is kafka slow?");
        assert_eq!(strip_mention("<@B0T>", "B0T"), "");
        assert_eq!(strip_mention("ask <@U1> instead", "B0T"), "ask <@U1> instead");
    }
}
