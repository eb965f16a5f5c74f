//! Deterministic [`LlmClient`] for tests.
//!
//! Replies are keyed by a marker substring of the prompt, normally the
//! `[task:...]` line every rendered prompt starts with.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::llm::LlmClient;

#[derive(Clone, Debug)]
enum Reply {
    Text(String),
    Failure(String),
}

struct Rule {
    marker: String,
    replies: VecDeque<Reply>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct ScriptedLlm {
    rules: Mutex<Vec<Rule>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, marker: &str, reply: impl Into<String>) -> Self {
        self.push(marker, vec![Reply::Text(reply.into())])
    }

    /// Replies are served in order; the last one repeats.
    pub fn on_sequence<S: Into<String>>(self, marker: &str, replies: Vec<S>) -> Self {
        self.push(marker, replies.into_iter().map(|reply| Reply::Text(reply.into())).collect())
    }

    pub fn fail_on(self, marker: &str, message: impl Into<String>) -> Self {
        self.push(marker, vec![Reply::Failure(message.into())])
    }

    pub fn delay_on(self, marker: &str, delay: Duration) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            match rules.iter_mut().find(|rule| rule.marker == marker) {
                Some(rule) => rule.delay = Some(delay),
                None => rules.push(Rule {
                    marker: marker.to_owned(),
                    replies: VecDeque::new(),
                    delay: Some(delay),
                }),
            }
        }
        self
    }

    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }

    pub fn prompts_matching(&self, marker: &str) -> Vec<String> {
        self.prompts().into_iter().filter(|prompt| prompt.contains(marker)).collect()
    }

    fn push(self, marker: &str, replies: Vec<Reply>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            match rules.iter_mut().find(|rule| rule.marker == marker) {
                Some(rule) => rule.replies.extend(replies),
                None => rules.push(Rule {
                    marker: marker.to_owned(),
                    replies: replies.into(),
                    delay: None,
                }),
            }
        }
        self
    }

    fn next_reply(&self, prompt: &str) -> (Option<Reply>, Option<Duration>) {
        let Ok(mut rules) = self.rules.lock() else {
            return (None, None);
        };
        let Some(rule) = rules.iter_mut().find(|rule| prompt.contains(&rule.marker)) else {
            return (None, None);
        };
        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        };
        (reply, rule.delay)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_owned());
        }

        let (reply, delay) = self.next_reply(prompt);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Failure(message)) => Err(anyhow!(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("no scripted reply for prompt: {}", first_line(prompt))),
        }
    }
}

fn first_line(prompt: &str) -> &str {
    prompt.lines().next().unwrap_or_default()
}
