//! Premium AI chat: an OpenAI-compatible client plus per-user sessions.

pub mod client;
pub mod session;

pub use client::LlmClient;
pub use session::ChatSessions;

use serenity::all::UserId;
use tracing::{error, warn};

/// Asks the model on behalf of `user_id`, threading their session history.
/// Always yields user-facing text; failures are described, never propagated.
pub async fn converse(
    llm: &LlmClient,
    sessions: &ChatSessions,
    system_prompt: &str,
    user_id: UserId,
    question: &str,
) -> String {
    let history = sessions.history(user_id);
    let messages = match client::build_messages(system_prompt, &history, question) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to build chat request: {}", e);
            return describe_error(&e.to_string());
        }
    };

    match llm.chat(messages).await {
        Ok(answer) if answer.is_empty() => "⚠️ AI returned an empty response.".to_string(),
        Ok(answer) => {
            sessions.record(user_id, question, &answer);
            answer
        }
        Err(e) => {
            warn!("LLM error for user {}: {:#}", user_id, e);
            describe_error(&format!("{:#}", e))
        }
    }
}

/// Maps a provider failure onto friendly text.
pub fn describe_error(err: &str) -> String {
    let lowered = err.to_lowercase();
    if lowered.contains("429") || lowered.contains("rate limit") {
        "🔥 **High Traffic:** AI is cooling down.".to_string()
    } else if lowered.contains("safety") || lowered.contains("blocked") {
        "⚠️ **Safety:** Message blocked.".to_string()
    } else {
        format!("⚠️ **AI Error:** `{}`", err)
    }
}

/// Splits `text` into parts of at most `limit` characters.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_error() {
        assert!(describe_error("HTTP 429 Too Many Requests").contains("High Traffic"));
        assert!(describe_error("Rate limit reached").contains("High Traffic"));
        assert!(describe_error("response blocked by SAFETY filter").contains("Safety"));
        let generic = describe_error("connection reset");
        assert!(generic.contains("AI Error"));
        assert!(generic.contains("connection reset"));
    }

    #[test]
    fn test_split_message() {
        assert!(split_message("", 1900).is_empty());
        assert_eq!(split_message("short", 1900), vec!["short"]);

        let long = "a".repeat(4000);
        let parts = split_message(&long, 1900);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 1900);
        assert_eq!(parts[2].len(), 200);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "é".repeat(5);
        let parts = split_message(&text, 2);
        assert_eq!(parts, vec!["éé", "éé", "é"]);
    }
}
