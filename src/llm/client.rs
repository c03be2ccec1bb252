use super::session::{ChatTurn, Role};
use crate::config::Config;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use std::time::Duration;

#[derive(Clone)]
pub struct LlmClient {
    chat_client: Client<OpenAIConfig>,
    chat_model: String,
}

impl LlmClient {
    /// Returns `None` when no endpoint is configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        let Some(url) = &config.llm_url else {
            return Ok(None);
        };

        let mut chat_config = OpenAIConfig::new().with_api_base(url);
        if let Some(key) = &config.llm_api_key {
            chat_config = chat_config.with_api_key(key);
        } else {
            chat_config = chat_config.with_api_key("unused");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;

        Ok(Some(Self {
            chat_client: Client::with_config(chat_config).with_http_client(http),
            chat_model: config.llm_model.clone(),
        }))
    }

    pub async fn chat(&self, messages: Vec<ChatCompletionRequestMessage>) -> anyhow::Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .build()?;

        let response = self.chat_client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

/// System prompt, prior turns, then the new question.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatTurn],
    question: &str,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut messages: Vec<ChatCompletionRequestMessage> =
        vec![ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()?
            .into()];

    for turn in history {
        let message: ChatCompletionRequestMessage = match turn.role {
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
        };
        messages.push(message);
    }

    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(question)
            .build()?
            .into(),
    );
    Ok(messages)
}
