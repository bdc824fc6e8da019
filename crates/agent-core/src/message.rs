//! Chat messages and per-agent history.
//!
//! A [`Message`] serializes to exactly the `{role, content}` object that
//! OpenAI-compatible endpoints expect.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    /// Human input; tool observations are also sent under this role
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Finished exchanges only: one user and one assistant message per turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_turn(&mut self, input: impl Into<String>, answer: impl Into<String>) {
        self.messages.push(Message::user(input));
        self.messages.push(Message::assistant(answer));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_turn_appends_pair() {
        let mut conv = Conversation::new();
        conv.record_turn("Hi", "Hello!");

        assert_eq!(
            conv.messages(),
            &[Message::user("Hi"), Message::assistant("Hello!")]
        );

        conv.clear();
        assert!(conv.is_empty());
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(Message::system("Be brief.")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "Be brief."}));
    }
}
