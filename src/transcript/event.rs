//! Events produced by one assistant run

use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit of streamed conversation progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new assistant message begins
    MessageStarted,
    /// Incremental text for the current message
    MessageDelta {
        text: String,
        /// Citation markers that replace `text` when non-empty
        annotations: Vec<Annotation>,
    },
    /// The current message finished; carries its final annotation list
    MessageCompleted { annotations: Vec<Annotation> },
    /// Token usage of a finished run step
    StepUsageReported { usage: Usage },
}

#[cfg(test)]
impl Event {
    pub fn delta(text: impl Into<String>) -> Self {
        Event::MessageDelta {
            text: text.into(),
            annotations: Vec::new(),
        }
    }

    pub fn completed(annotations: Vec<Annotation>) -> Self {
        Event::MessageCompleted { annotations }
    }
}

/// Reference from message text to a cited file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Zero-based position as reported by the event
    #[serde(default)]
    pub index: usize,
    /// File id to resolve through the file registry
    #[serde(default)]
    pub file_citation: Option<String>,
}

#[cfg(test)]
impl Annotation {
    pub fn citation(index: usize, file_id: impl Into<String>) -> Self {
        Self {
            index,
            file_citation: Some(file_id.into()),
        }
    }
}

/// Usage summary of a run step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completion_tokens={} prompt_tokens={} total_tokens={}",
            self.completion_tokens, self.prompt_tokens, self.total_tokens
        )
    }
}
