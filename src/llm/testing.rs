//! Scripted chat model for unit tests

use crate::error::{AssistantError, AssistantResult};
use crate::llm::chat_client::ChatModel;
use crate::llm::prompts::ChatPrompt;
use async_trait::async_trait;
use std::sync::Mutex;

struct Rule {
    needles: Vec<String>,
    reply: String,
}

/// Replies with the first rule whose needles all occur in the rendered prompt
#[derive(Default)]
pub struct ScriptedModel {
    rules: Vec<Rule>,
    calls: Mutex<Vec<ChatPrompt>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, needle: &str, reply: &str) -> Self {
        self.reply_when(&[needle], reply)
    }

    pub fn reply_when(mut self, needles: &[&str], reply: &str) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            reply: reply.to_string(),
        });
        self
    }

    pub fn calls(&self) -> Vec<ChatPrompt> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, prompt: &ChatPrompt) -> AssistantResult<String> {
        self.calls.lock().unwrap().push(prompt.clone());
        let text = format!("{}\n{}", prompt.system, prompt.human);
        self.rules
            .iter()
            .find(|rule| rule.needles.iter().all(|n| text.contains(n.as_str())))
            .map(|rule| rule.reply.clone())
            .ok_or_else(|| AssistantError::llm("no scripted reply for prompt"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
