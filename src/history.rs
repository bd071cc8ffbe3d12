use crate::chat_api::Message;
use crate::session::{ChatMessage, Role};
use crate::thinking::{THINKING_CLOSE, THINKING_OPEN};

/// Builds the request for the next turn: system prompt, then the stored
/// conversation in order. The last entry is expected to be the new user message.
///
/// Stored traces are re-embedded after the answer so the model sees its own
/// earlier reasoning. Blank turns become a single space; some backends reject
/// empty message content.
pub fn build_request_messages(system: &str, history: &[ChatMessage]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system.trim().is_empty() {
        messages.push(Message::new("system", system));
    }
    messages.extend(history.iter().map(to_wire_message));
    messages
}

fn to_wire_message(message: &ChatMessage) -> Message {
    let role = match message.role {
        Role::User => "user",
        Role::Model => "assistant",
    };

    let mut text = message.content.clone();
    if let Some(thinking) = message.thinking.as_deref().filter(|t| !t.is_empty()) {
        text.push('\n');
        text.push_str(THINKING_OPEN);
        text.push_str(thinking);
        text.push_str(THINKING_CLOSE);
    }

    let mut images = Vec::new();
    if let Some(attachment) = &message.attachment {
        if attachment.is_image() {
            images.push(attachment.data.clone());
        } else {
            text.push_str(&format!(
                "\n[attachment: {} ({})]",
                attachment.name, attachment.mime_type
            ));
        }
    }

    if text.trim().is_empty() && images.is_empty() {
        text = " ".to_string();
    }

    Message {
        role: role.to_string(),
        content: text,
        images,
    }
}
