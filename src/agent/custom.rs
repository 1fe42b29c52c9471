//! Agent backed by a model endpoint instead of a browser tab

use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::debug;

use super::model::{ChatMessage, ChatModel, ChatRole};
use super::{Agent, AgentError, AgentKind, AgentResult};

const HEADER_END: &str = "<|end_header_id|>";
const SPECIAL_TOKEN_START: &str = "<|";

/// Reduce raw model output to one line.
///
/// Raw Llama-3 style output keeps its chat template tokens; only the text
/// after the last header and before the next special token is the reply.
/// A truncated reply has no closing token and is kept to the end. Markup is
/// left for the relay, which cleans every speaker's message once.
pub fn clean_model_output(raw: &str) -> String {
    let mut reply = raw;
    if let Some(pos) = reply.rfind(HEADER_END) {
        reply = &reply[pos + HEADER_END.len()..];
    }
    if let Some(end) = reply.find(SPECIAL_TOKEN_START) {
        reply = &reply[..end];
    }

    let flattened = reply.replace("\n\n", " ").replace('\n', " ");
    flattened.trim().to_string()
}

pub struct CustomAgent {
    name: String,
    model: Box<dyn ChatModel>,
    system_prompt: Option<String>,
    history: VecDeque<ChatMessage>,
    history_turns: usize,
    current_message: String,
}

impl CustomAgent {
    pub fn new(
        name: impl Into<String>,
        model: Box<dyn ChatModel>,
        system_prompt: Option<String>,
        history_turns: usize,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            system_prompt,
            history: VecDeque::new(),
            history_turns,
            current_message: String::new(),
        }
    }

    fn build_prompt(&self, message: &str) -> Vec<ChatMessage> {
        let mut prompt = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = self.system_prompt.as_deref() {
            prompt.push(ChatMessage::new(ChatRole::System, system));
        }
        prompt.extend(self.history.iter().cloned());
        prompt.push(ChatMessage::new(ChatRole::User, message));
        prompt
    }

    fn remember(&mut self, message: &str, reply: &str) {
        if self.history_turns == 0 {
            return;
        }
        self.history.push_back(ChatMessage::new(ChatRole::User, message));
        self.history.push_back(ChatMessage::new(ChatRole::Assistant, reply));
        while self.history.len() > self.history_turns * 2 {
            self.history.pop_front();
        }
    }
}

#[async_trait]
impl Agent for CustomAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Custom
    }

    fn current_message(&self) -> &str {
        &self.current_message
    }

    fn set_current_message(&mut self, message: String) {
        self.current_message = message;
    }

    async fn latest_message(&mut self) -> AgentResult<String> {
        // No site greeting exists, so seed one when this agent opens
        if self.current_message.is_empty() {
            self.current_message = format!("Hello, I am {}.", self.name);
        }
        Ok(self.current_message.clone())
    }

    async fn send_message(&mut self, message: &str) -> AgentResult<()> {
        let prompt = self.build_prompt(message);
        let raw = self.model.complete(&prompt).await?;
        let reply = clean_model_output(&raw);

        if reply.is_empty() {
            return Err(AgentError::Model(format!(
                "Custom agent {} received an empty reply",
                self.name
            )));
        }

        debug!("Custom agent {} replied: {}", self.name, reply);
        self.remember(message, &reply);
        self.current_message = reply;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Replays canned replies and records every prompt
    #[derive(Clone, Default)]
    pub struct ScriptedModel {
        pub replies: Arc<Mutex<VecDeque<String>>>,
        pub prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.iter().map(|r| r.to_string()).collect())),
                prompts: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> AgentResult<String> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AgentError::Model("script exhausted".into()))
        }
    }

    #[test]
    fn cleans_llama_template_output() {
        let raw = "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\nhi<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\nHello there!\nHow are you?<|eot_id|>";
        assert_eq!(clean_model_output(raw), "Hello there! How are you?");
    }

    #[test]
    fn keeps_truncated_reply_without_end_token() {
        let raw = "<|start_header_id|>assistant<|end_header_id|>\n\nI was about to say";
        assert_eq!(clean_model_output(raw), "I was about to say");
    }

    #[test]
    fn plain_completion_only_loses_newlines() {
        assert_eq!(clean_model_output("Sure.\n\n<b>Yes</b>\nok"), "Sure. <b>Yes</b> ok");
    }

    #[test]
    fn escaped_markup_survives_single_relay_cleaning() {
        let reply = clean_model_output("Use &lt;br&gt; for a line break");
        assert_eq!(crate::utils::clean_message(&reply), "Use <br> for a line break");
    }

    #[tokio::test]
    async fn seeds_greeting_when_opening() {
        let mut agent = CustomAgent::new("Ada", Box::new(ScriptedModel::default()), None, 4);
        assert_eq!(agent.latest_message().await.unwrap(), "Hello, I am Ada.");
        assert_eq!(agent.current_message(), "Hello, I am Ada.");
    }

    #[tokio::test]
    async fn reply_becomes_current_message() {
        let model = ScriptedModel::new(&["Nice to meet you.\n"]);
        let mut agent = CustomAgent::new("Ada", Box::new(model.clone()), Some("Be a pirate.".into()), 4);

        agent.send_message("Hi Ada").await.unwrap();

        assert_eq!(agent.current_message(), "Nice to meet you.");
        assert_eq!(agent.latest_message().await.unwrap(), "Nice to meet you.");
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts[0][0], ChatMessage::new(ChatRole::System, "Be a pirate."));
        assert_eq!(prompts[0][1], ChatMessage::new(ChatRole::User, "Hi Ada"));
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let model = ScriptedModel::new(&["r1", "r2", "r3"]);
        let mut agent = CustomAgent::new("Ada", Box::new(model.clone()), None, 1);

        agent.send_message("m1").await.unwrap();
        agent.send_message("m2").await.unwrap();
        agent.send_message("m3").await.unwrap();

        let prompts = model.prompts.lock().unwrap();
        let last = &prompts[2];
        assert_eq!(last.len(), 3);
        assert_eq!(last[0].content, "m2");
        assert_eq!(last[1].content, "r2");
        assert_eq!(last[2].content, "m3");
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let model = ScriptedModel::new(&["<|eot_id|>"]);
        let mut agent = CustomAgent::new("Ada", Box::new(model), None, 0);
        assert!(matches!(agent.send_message("hi").await, Err(AgentError::Model(_))));
    }
}
