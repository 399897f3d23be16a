use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// Spoken user input.
    User,
    /// The remote agent.
    Agent,
    /// User input the agent recognized from sign language.
    Signed,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Speaker::User => "user",
            Speaker::Agent => "agent",
            Speaker::Signed => "signed",
        };
        f.write_str(label)
    }
}

/// Which side of the conversation a fragment transcribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranscriptChannel {
    Input,
    Output,
}

/// A finalized, speaker-tagged line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(speaker: Speaker, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text: text.into(),
            timestamp,
        }
    }
}

/// Ordered, append-only record of a session's utterances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranscriptLog {
    entries: Vec<Utterance>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, utterance: Utterance) {
        self.entries.push(utterance);
    }

    pub fn extend(&mut self, utterances: impl IntoIterator<Item = Utterance>) {
        self.entries.extend(utterances);
    }

    pub fn entries(&self) -> &[Utterance] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<Utterance> {
        self.entries
    }
}
