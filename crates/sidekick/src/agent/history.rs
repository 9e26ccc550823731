use std::collections::HashMap;

use uuid::Uuid;

use crate::provider::types::{Message, Sender};

/// Append-only conversation log with an id index.
///
/// Entries are never removed once pushed (except by
/// [`seed_first_assistant`](Self::seed_first_assistant) with `reset`, which
/// rebuilds the log); the only in-place mutations are streaming delta
/// appends and wholesale content replacement, both by message id.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
    index: HashMap<Uuid, usize>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.index.get(&id).map(|&i| &self.entries[i])
    }

    /// Append a message, returning its id.
    pub fn push(&mut self, message: Message) -> Uuid {
        let id = message.id;
        self.index.insert(id, self.entries.len());
        self.entries.push(message);
        id
    }

    /// Append a streaming delta to an existing message's content.
    /// Returns the updated message, or `None` for an unknown id.
    pub fn append_content(&mut self, id: Uuid, delta: &str) -> Option<&Message> {
        let &i = self.index.get(&id)?;
        self.entries[i].content.push_str(delta);
        Some(&self.entries[i])
    }

    /// Overwrite an existing message's content wholesale (fallback
    /// substitution). Returns the updated message, or `None` for an
    /// unknown id.
    pub fn replace_content(&mut self, id: Uuid, content: &str) -> Option<&Message> {
        let &i = self.index.get(&id)?;
        self.entries[i].content = content.to_string();
        Some(&self.entries[i])
    }

    pub fn last_user(&self) -> Option<&Message> {
        self.entries
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.entries
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Assistant)
    }

    /// Seed the log with a delegation brief.
    ///
    /// With `reset`, the log collapses to `[brief, ...prior user messages]`
    /// in original order — prior assistant messages are discarded. Without
    /// `reset`, the brief is applied only when no assistant message exists
    /// yet or the first assistant message is blank, so a live conversation
    /// is never clobbered. Returns whether the brief was applied.
    pub fn seed_first_assistant(&mut self, brief: &str, reset: bool) -> bool {
        if reset {
            let users: Vec<Message> = self
                .entries
                .iter()
                .filter(|m| m.sender == Sender::User)
                .cloned()
                .collect();
            self.entries.clear();
            self.index.clear();
            self.push(Message::assistant(brief));
            for user in users {
                self.push(user);
            }
            return true;
        }

        let first = self
            .entries
            .iter()
            .position(|m| m.sender == Sender::Assistant);
        match first {
            None => {
                for slot in self.index.values_mut() {
                    *slot += 1;
                }
                let brief = Message::assistant(brief);
                self.index.insert(brief.id, 0);
                self.entries.insert(0, brief);
                true
            }
            Some(i) if self.entries[i].is_blank() => {
                self.entries[i].content = brief.to_string();
                true
            }
            Some(_) => false,
        }
    }
}
