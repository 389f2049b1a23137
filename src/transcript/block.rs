//! Displayable content blocks

use serde::{Deserialize, Serialize};

/// One typed unit of turn content
///
/// Serialized as `{"type": "text", "content": "..."}` so the UI can switch
/// on `type` the same way for every block kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
#[allow(dead_code)] // Run events currently only produce text
pub enum ContentBlock {
    Text(String),
    /// Rendered image fragments (code interpreter output)
    Image(Vec<String>),
    CodeInput(String),
    CodeOutput(String),
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text(s.into())
    }

    /// Text content, if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(text) => Some(text),
            _ => None,
        }
    }
}
