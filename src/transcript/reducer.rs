//! Streamed-event reducer
//!
//! A strict left fold of run events into one assistant turn. Every mutation
//! of the turn is mirrored by a [`TurnUpdate`], so a client that replays the
//! updates in order ends up with exactly the blocks of the finished turn.
//!
//! Citation numbering:
//! - delta markers use the index reported by the delta, plus one;
//! - the "Files" list uses the 1-based position in the completed message's
//!   annotation list. Entries whose citation cannot be resolved are left
//!   out, but still consume their number.

use super::{Annotation, ContentBlock, Event, Turn, Usage};
use crate::assistant::{AssistantError, FileRegistry};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Layout of the cited-files section appended on message completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationFormat {
    /// `\n\nFiles: [1] a.pdf; [2] b.pdf; `
    #[default]
    Inline,
    /// `\n\nFiles:\n- [1] a.pdf\n- [2] b.pdf\n`
    Bulleted,
}

impl CitationFormat {
    fn header(self) -> &'static str {
        match self {
            CitationFormat::Inline => "\n\nFiles: ",
            CitationFormat::Bulleted => "\n\nFiles:\n",
        }
    }

    fn entry(self, number: usize, filename: &str) -> String {
        match self {
            CitationFormat::Inline => format!("[{number}] {filename}; "),
            CitationFormat::Bulleted => format!("- [{number}] {filename}\n"),
        }
    }
}

/// Where usage summary blocks land in the turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePlacement {
    /// Appended as soon as the usage is reported
    #[default]
    Interleaved,
    /// Held back and appended after the last event
    Trailing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReducerOptions {
    pub print_usage: bool,
    pub citation_format: CitationFormat,
    pub usage_placement: UsagePlacement,
}

/// Incremental change to the turn being built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnUpdate {
    /// A new empty text block was appended and is receiving text
    BlockOpened { index: usize },
    /// Text appended to the block at `index`
    Text { index: usize, fragment: String },
    /// A finished block appended in one step
    BlockAppended { index: usize, block: ContentBlock },
    /// The block at `index` receives no more text
    BlockClosed { index: usize },
}

/// The run stream broke before it was exhausted
///
/// Carries everything reduced so far; the caller decides whether to keep it.
#[derive(Debug, Error)]
#[error("assistant stream interrupted: {source}")]
pub struct StreamInterrupted {
    pub partial: Turn,
    pub source: AssistantError,
}

/// Builds one assistant turn from run events
#[derive(Debug)]
pub struct TranscriptReducer {
    turn: Turn,
    open: Option<usize>,
    pending_usage: Vec<Usage>,
    options: ReducerOptions,
}

impl TranscriptReducer {
    pub fn new(options: ReducerOptions) -> Self {
        Self {
            turn: Turn::assistant(),
            open: None,
            pending_usage: Vec::new(),
            options,
        }
    }

    /// Apply one event, returning the updates it produced in order
    pub async fn apply<R>(&mut self, event: Event, files: &R) -> Vec<TurnUpdate>
    where
        R: FileRegistry + ?Sized,
    {
        let mut updates = Vec::new();
        match event {
            Event::MessageStarted => {
                self.close(&mut updates);
                self.open(&mut updates);
            }
            Event::MessageDelta { text, annotations } => {
                let fragment = if annotations.is_empty() {
                    text
                } else {
                    annotations
                        .iter()
                        .map(|a| format!(" [{}] ", a.index + 1))
                        .collect()
                };
                self.append(fragment, &mut updates);
            }
            Event::MessageCompleted { annotations } => {
                if !annotations.is_empty() {
                    let fragment = self.cited_files(&annotations, files).await;
                    self.append(fragment, &mut updates);
                }
                self.close(&mut updates);
            }
            Event::StepUsageReported { usage } => {
                if self.options.print_usage {
                    match self.options.usage_placement {
                        UsagePlacement::Interleaved => self.push_usage(usage, &mut updates),
                        UsagePlacement::Trailing => self.pending_usage.push(usage),
                    }
                }
            }
        }
        updates
    }

    /// Close the open block and flush held-back usage blocks
    pub fn finish(mut self) -> (Turn, Vec<TurnUpdate>) {
        let mut updates = Vec::new();
        self.close(&mut updates);
        for usage in std::mem::take(&mut self.pending_usage) {
            self.push_usage(usage, &mut updates);
        }
        (self.turn, updates)
    }

    /// Whatever has been reduced so far, untouched
    pub fn into_partial(self) -> Turn {
        self.turn
    }

    fn open(&mut self, updates: &mut Vec<TurnUpdate>) -> usize {
        let index = self.turn.blocks.len();
        self.turn.blocks.push(ContentBlock::text(""));
        self.open = Some(index);
        updates.push(TurnUpdate::BlockOpened { index });
        index
    }

    fn close(&mut self, updates: &mut Vec<TurnUpdate>) {
        if let Some(index) = self.open.take() {
            updates.push(TurnUpdate::BlockClosed { index });
        }
    }

    /// Append to the open block, opening one if text arrives without a start
    fn append(&mut self, fragment: String, updates: &mut Vec<TurnUpdate>) {
        if fragment.is_empty() {
            return;
        }
        let index = match self.open {
            Some(index) => index,
            None => self.open(updates),
        };
        if let Some(ContentBlock::Text(content)) = self.turn.blocks.get_mut(index) {
            content.push_str(&fragment);
            updates.push(TurnUpdate::Text { index, fragment });
        }
    }

    fn push_usage(&mut self, usage: Usage, updates: &mut Vec<TurnUpdate>) {
        let index = self.turn.blocks.len();
        let block = ContentBlock::text(usage.to_string());
        self.turn.blocks.push(block.clone());
        updates.push(TurnUpdate::BlockAppended { index, block });
    }

    async fn cited_files<R>(&self, annotations: &[Annotation], files: &R) -> String
    where
        R: FileRegistry + ?Sized,
    {
        let format = self.options.citation_format;
        let mut section = String::from(format.header());
        for (position, annotation) in annotations.iter().enumerate() {
            let Some(file_id) = &annotation.file_citation else {
                continue;
            };
            match files.filename(file_id).await {
                Ok(filename) => section.push_str(&format.entry(position + 1, &filename)),
                Err(e) => {
                    tracing::debug!(file_id = %file_id, error = %e, "Skipping unresolved citation");
                }
            }
        }
        section
    }
}

/// Fold a run's events into a finished assistant turn
///
/// `on_update` sees every update in the order events arrived. A stream
/// error or cancellation returns the partial turn inside
/// [`StreamInterrupted`].
pub async fn reduce<S, R, F>(
    events: S,
    files: &R,
    options: ReducerOptions,
    cancel: &CancellationToken,
    mut on_update: F,
) -> Result<Turn, StreamInterrupted>
where
    S: Stream<Item = Result<Event, AssistantError>>,
    R: FileRegistry + ?Sized,
    F: FnMut(TurnUpdate),
{
    let mut events = std::pin::pin!(events);
    let mut reducer = TranscriptReducer::new(options);

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(abandoned(reducer)),
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                // Citation lookups are remote calls; a cancel must not wait on them
                let applied = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    updates = reducer.apply(event, files) => Some(updates),
                };
                let Some(updates) = applied else {
                    return Err(abandoned(reducer));
                };
                for update in updates {
                    on_update(update);
                }
            }
            Some(Err(source)) => {
                return Err(StreamInterrupted {
                    partial: reducer.into_partial(),
                    source,
                });
            }
            None => break,
        }
    }

    let (turn, updates) = reducer.finish();
    updates.into_iter().for_each(on_update);
    Ok(turn)
}

fn abandoned(reducer: TranscriptReducer) -> StreamInterrupted {
    StreamInterrupted {
        partial: reducer.into_partial(),
        source: AssistantError::cancelled("Run abandoned before completion"),
    }
}
