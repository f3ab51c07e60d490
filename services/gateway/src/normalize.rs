//! The well-typed adaptor at the chat-SDK boundary (§9): flattens a
//! `teloxide::types::Message` into the bounded `NormalizedMessage` shape
//! every handler actually consumes, replacing the original's runtime
//! reflection over the SDK's message object.

use teloxide::types::Message;

use crate::ports::NormalizedMessage;

pub fn normalize_message(message: &Message) -> NormalizedMessage {
    let text = message.text().unwrap_or_default().to_string();
    let filtered_parts = text.split_whitespace().map(str::to_string).collect();

    let reply = message.reply_to_message();

    NormalizedMessage {
        message_id: message.id.0.to_string(),
        chat_id: message.chat.id.0.to_string(),
        text,
        filtered_parts,
        from_user_id: message.from.as_ref().map(|u| u.id.0 as i64),
        from_user_name: message.from.as_ref().map(|u| u.full_name()).unwrap_or_default(),
        reply_to_message_id: reply.map(|r| r.id.0.to_string()),
        reply_text: reply.and_then(|r| r.text()).unwrap_or_default().to_string(),
        reply_user_id: reply.and_then(|r| r.from.as_ref()).map(|u| u.id.0.to_string()),
        reply_user_name: reply.and_then(|r| r.from.as_ref()).map(|u| u.full_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_parts_splits_on_whitespace() {
        let parts: Vec<String> = "  .vdl   https://host/path  ".split_whitespace().map(str::to_string).collect();
        assert_eq!(parts, vec![".vdl".to_string(), "https://host/path".to_string()]);
    }
}
