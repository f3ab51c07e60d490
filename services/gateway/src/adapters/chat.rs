//! Chat-platform client, grounded on the pack's `teloxide` manifests
//! (`other_examples/manifests/{zhubby-moltis,the-snesler-spacebot,Zoltesh-buddy}`).

use teloxide::payloads::{EditMessageCaptionSetters, SendAudioSetters, SendMessageSetters, SendVideoSetters};
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ReactionType};

use crate::ports::{ChatClient, ChatError, SentMessage};

pub struct TeloxideChat {
    bot: Bot,
}

impl TeloxideChat {
    pub fn new(token: impl Into<String>) -> Self {
        TeloxideChat { bot: Bot::new(token) }
    }
}

fn parse_chat(chat_id: &str) -> Result<ChatId, ChatError> {
    chat_id.parse::<i64>().map(ChatId).map_err(|_| ChatError::Api(format!("invalid chat id: {chat_id}")))
}

fn parse_message(message_id: &str) -> Result<MessageId, ChatError> {
    message_id.parse::<i32>().map(MessageId).map_err(|_| ChatError::Api(format!("invalid message id: {message_id}")))
}

#[async_trait::async_trait]
impl ChatClient for TeloxideChat {
    async fn send_message(&self, chat_id: &str, text: &str, reply_to_message_id: Option<&str>) -> Result<SentMessage, ChatError> {
        let chat = parse_chat(chat_id)?;
        let mut request = self.bot.send_message(chat, text);
        if let Some(reply_to) = reply_to_message_id {
            request = request.reply_to_message_id(parse_message(reply_to)?);
        }
        let message = request.send().await.map_err(|e| ChatError::Api(e.to_string()))?;
        Ok(SentMessage {
            message_id: message.id.0.to_string(),
            file_id: None,
        })
    }

    async fn send_video(&self, chat_id: &str, path_or_file_id: &str, caption: &str, reply_to_message_id: Option<&str>) -> Result<SentMessage, ChatError> {
        let chat = parse_chat(chat_id)?;
        let input = InputFile::file(std::path::Path::new(path_or_file_id));
        let mut request = self.bot.send_video(chat, input).caption(caption);
        if let Some(reply_to) = reply_to_message_id {
            request = request.reply_to_message_id(parse_message(reply_to)?);
        }
        let message = request.send().await.map_err(|e| ChatError::Api(e.to_string()))?;
        let file_id = message.video().map(|v| v.file.id.0.clone());
        Ok(SentMessage {
            message_id: message.id.0.to_string(),
            file_id,
        })
    }

    async fn send_audio(&self, chat_id: &str, path_or_file_id: &str, caption: &str, reply_to_message_id: Option<&str>) -> Result<SentMessage, ChatError> {
        let chat = parse_chat(chat_id)?;
        let input = InputFile::file(std::path::Path::new(path_or_file_id));
        let mut request = self.bot.send_audio(chat, input).caption(caption);
        if let Some(reply_to) = reply_to_message_id {
            request = request.reply_to_message_id(parse_message(reply_to)?);
        }
        let message = request.send().await.map_err(|e| ChatError::Api(e.to_string()))?;
        let file_id = message.audio().map(|a| a.file.id.0.clone());
        Ok(SentMessage {
            message_id: message.id.0.to_string(),
            file_id,
        })
    }

    async fn edit_caption(&self, chat_id: &str, message_id: &str, caption: &str) -> Result<(), ChatError> {
        let chat = parse_chat(chat_id)?;
        let message = parse_message(message_id)?;
        self.bot
            .edit_message_caption(chat, message)
            .caption(caption)
            .send()
            .await
            .map_err(|e| ChatError::Api(e.to_string()))?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), ChatError> {
        let chat = parse_chat(chat_id)?;
        let message = parse_message(message_id)?;
        self.bot.delete_message(chat, message).send().await.map_err(|e| ChatError::Api(e.to_string()))?;
        Ok(())
    }

    async fn react(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<(), ChatError> {
        let chat = parse_chat(chat_id)?;
        let message = parse_message(message_id)?;
        self.bot
            .set_message_reaction(chat, message)
            .reaction(vec![ReactionType::Emoji { emoji: emoji.to_string() }])
            .send()
            .await
            .map_err(|e| ChatError::Api(e.to_string()))?;
        Ok(())
    }
}
