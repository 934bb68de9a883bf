//! Conversation memory
//!
//! Keeps the running chat history and decides which part of it is sent to
//! the model on each turn. The system message, if any, is always sent; the
//! remaining history is cut to the most recent `window` messages.

use crate::llm::LLMClient;
use crate::types::{Message, MessageRole, Result};

/// Default number of recent messages to include in context.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    system: Option<Message>,
    messages: Vec<Message>,
    window: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self {
            system: None,
            messages: Vec::new(),
            window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(Message::system(system)),
            ..Self::new()
        }
    }

    /// Set the history window; a window of 0 sends only the system message.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Full history, excluding the system message.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Messages sent to the model: system message plus the latest `window` turns.
    pub fn window(&self) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(self.window);
        self.system
            .iter()
            .chain(self.messages[start..].iter())
            .cloned()
            .collect()
    }

    /// Record `input`, ask the model with the windowed history and record the reply.
    ///
    /// If the call fails the user turn stays in the history.
    pub async fn respond(&mut self, llm: &dyn LLMClient, input: &str) -> Result<String> {
        self.push_user(input);
        let reply = llm.generate_with_history(&self.window()).await?;
        self.push_assistant(reply.clone());
        Ok(reply)
    }

    /// Render the history as a plain transcript, for prompts that take history as text.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    MessageRole::System => "System",
                    MessageRole::User => "Human",
                    MessageRole::Assistant => "AI",
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
