use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::providers::traits::{ChatMessage, Role};

pub const GREETING: &str = "Hello! I am your Tax Expert. Ask me about HRA, 80C, or Home Loans.";

/// Entries kept in a transcript; the oldest go first.
pub const TRANSCRIPT_LIMIT: usize = 500;

/// Rough token count, same heuristic as the rest of the app: whitespace words.
pub fn approx_tokens(text: &str) -> usize {
    text.split_whitespace().count().max(1)
}

/// Conversation buffer fed back to the model on every turn.
///
/// Messages are kept in arrival order. Only the newest messages that fit in
/// `token_limit` are replayed, and a message is never cut in half. Anything
/// older can never be replayed again and is dropped on the next push.
#[derive(Debug, Clone)]
pub struct ChatMemory {
    messages: Vec<ChatMessage>,
    token_limit: usize,
}

impl ChatMemory {
    pub fn new(token_limit: usize) -> Self {
        Self { messages: Vec::new(), token_limit }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        let start = self.fitting_start();
        self.messages.drain(..start);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Newest messages within the token budget, oldest first. A window never
    /// opens on an assistant turn, since providers expect the user to speak first.
    pub fn window(&self) -> Vec<ChatMessage> {
        let mut window = &self.messages[self.fitting_start()..];
        while let Some(first) = window.first() {
            if first.role == Role::User {
                break;
            }
            window = &window[1..];
        }
        window.to_vec()
    }

    /// Index of the oldest message in the newest run that fits the budget.
    fn fitting_start(&self) -> usize {
        let mut used = 0;
        let mut start = self.messages.len();

        for (i, message) in self.messages.iter().enumerate().rev() {
            let cost = approx_tokens(&message.content);
            if used + cost > self.token_limit {
                break;
            }
            used += cost;
            start = i;
        }
        start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// What the user sees: the greeting followed by every turn, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub started: DateTime<Utc>,
    entries: Vec<TranscriptEntry>,
}

impl ChatSession {
    pub fn new() -> Self {
        let mut session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            started: Utc::now(),
            entries: Vec::new(),
        };
        session.push(Role::Assistant, GREETING);
        session
    }

    pub fn push(&mut self, role: Role, content: &str) {
        self.entries.push(TranscriptEntry {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        if self.entries.len() > TRANSCRIPT_LIMIT {
            let excess = self.entries.len() - TRANSCRIPT_LIMIT;
            self.entries.drain(..excess);
        }
    }

    pub fn push_user(&mut self, content: &str) {
        self.push(Role::User, content);
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.push(Role::Assistant, content);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_arrival_order_within_budget() {
        let mut memory = ChatMemory::new(6);
        memory.push(ChatMessage::user("one two three"));
        memory.push(ChatMessage::assistant("four five"));
        memory.push(ChatMessage::user("six seven"));
        memory.push(ChatMessage::assistant("eight nine"));

        let window = memory.window();
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["six seven", "eight nine"]);
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn storage_stays_within_token_limit() {
        let mut memory = ChatMemory::new(10);
        for i in 0..1000 {
            memory.push(ChatMessage::user(format!("question {}", i)));
            memory.push(ChatMessage::assistant(format!("answer {}", i)));
        }

        assert_eq!(memory.len(), 5);
        assert_eq!(memory.all().last().unwrap().content, "answer 999");
        assert_eq!(memory.window().first().unwrap().content, "question 998");
    }

    #[test]
    fn window_never_starts_with_assistant() {
        let mut memory = ChatMemory::new(4);
        memory.push(ChatMessage::user("a b c"));
        memory.push(ChatMessage::assistant("d"));
        memory.push(ChatMessage::user("e f"));

        let window = memory.window();
        assert_eq!(window, vec![ChatMessage::user("e f")]);
    }

    #[test]
    fn oversized_message_is_not_split() {
        let mut memory = ChatMemory::new(2);
        memory.push(ChatMessage::user("far too many words here"));
        assert!(memory.window().is_empty());
    }

    #[test]
    fn reset_clears_history() {
        let mut memory = ChatMemory::new(100);
        memory.push(ChatMessage::user("hi"));
        memory.reset();
        assert!(memory.is_empty());
        assert!(memory.window().is_empty());
    }

    #[test]
    fn session_starts_with_greeting_and_appends_in_order() {
        let mut session = ChatSession::new();
        session.push_user("What is HRA?");
        session.push_assistant("House Rent Allowance.");

        let roles: Vec<Role> = session.entries().iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(session.entries()[0].content, GREETING);
    }

    #[test]
    fn transcript_keeps_the_newest_entries() {
        let mut session = ChatSession::new();
        for i in 0..TRANSCRIPT_LIMIT {
            session.push_user(&format!("question {}", i));
        }

        assert_eq!(session.entries().len(), TRANSCRIPT_LIMIT);
        assert_eq!(session.entries()[0].content, "question 0");
        assert_eq!(session.entries().last().unwrap().content, format!("question {}", TRANSCRIPT_LIMIT - 1));
    }
}
