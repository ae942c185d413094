//! History hygiene applied before anything is sent to the provider.

use wardops_core::message::{Message, Role};

/// Appended to content cut at the character cap.
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Strip control characters (keeping newlines and tabs) and cap the length.
///
/// `max_chars` counts characters, not bytes, so multi-byte text is never
/// split inside a code point.
pub fn sanitize_content(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars));
    let mut kept = 0usize;
    for c in text.chars() {
        if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
            continue;
        }
        if kept == max_chars {
            out.push_str(TRUNCATION_MARKER);
            return out;
        }
        out.push(c);
        kept += 1;
    }
    out
}

pub fn sanitize_message(mut message: Message, max_chars: usize) -> Message {
    message.content = sanitize_content(&message.content, max_chars);
    message
}

/// Keep the most recent `limit` messages.
///
/// Tool results at the front of what remains lost the assistant message that
/// requested them and are dropped as well; providers reject tool messages
/// without a matching request.
pub fn trim_history(history: &[Message], limit: usize) -> Vec<Message> {
    let start = history.len().saturating_sub(limit);
    let kept = &history[start..];
    let orphans = kept.iter().take_while(|m| m.role == Role::Tool).count();
    kept[orphans..].to_vec()
}

/// The first message whose role the provider would not accept.
pub fn find_invalid(history: &[Message]) -> Option<(usize, &Message)> {
    history
        .iter()
        .enumerate()
        .find(|(_, m)| !m.role.is_recognized())
}
