//! Run event stream parsing
//!
//! Maps the assistant API's server-sent events onto transcript events.
//! Event kinds the transcript has no use for are skipped here, so the
//! transcript's `Event` stays a closed set.

use super::AssistantError;
use crate::transcript::{Annotation, Event, Usage};
use eventsource_stream::{EventStream, Eventsource};
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Outcome of parsing one server-sent event
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RunSignal {
    Event(Event),
    Ignored,
    Done,
}

/// Converts an SSE byte stream into transcript events
pub struct RunEventStream<S> {
    inner: EventStream<S>,
    finished: bool,
}

impl<S> RunEventStream<S> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
            finished: false,
        }
    }
}

impl<S, B, E> Stream for RunEventStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    type Item = Result<Event, AssistantError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            let item = match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(item) => item,
                Poll::Pending => return Poll::Pending,
            };

            match item {
                Some(Ok(sse)) => match parse_run_event(&sse.event, &sse.data) {
                    Ok(RunSignal::Event(event)) => return Poll::Ready(Some(Ok(event))),
                    Ok(RunSignal::Ignored) => {}
                    Ok(RunSignal::Done) => {
                        self.finished = true;
                        return Poll::Ready(None);
                    }
                    Err(e) => {
                        self.finished = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Some(Err(e)) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(AssistantError::stream(format!(
                        "SSE stream error: {e}"
                    )))));
                }
                None => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

/// Parse a single server-sent event by name and data
pub(crate) fn parse_run_event(event_type: &str, data: &str) -> Result<RunSignal, AssistantError> {
    match event_type {
        "thread.message.created" => Ok(RunSignal::Event(Event::MessageStarted)),
        "thread.message.delta" => {
            let parsed: WireMessageDelta = parse_data(event_type, data)?;
            let Some(text) = first_text_part(parsed.delta.content) else {
                return Ok(RunSignal::Ignored);
            };
            Ok(RunSignal::Event(Event::MessageDelta {
                text: text.value,
                annotations: to_annotations(text.annotations),
            }))
        }
        "thread.message.completed" => {
            let parsed: WireMessage = parse_data(event_type, data)?;
            let annotations = first_text_part(parsed.content)
                .map(|text| to_annotations(text.annotations))
                .unwrap_or_default();
            Ok(RunSignal::Event(Event::MessageCompleted { annotations }))
        }
        "thread.run.step.completed" => {
            let parsed: WireRunStep = parse_data(event_type, data)?;
            Ok(parsed.usage.map_or(RunSignal::Ignored, |usage| {
                RunSignal::Event(Event::StepUsageReported { usage })
            }))
        }
        "error" => {
            let message = serde_json::from_str::<WireError>(data)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| data.to_string());
            Err(AssistantError::stream(format!("Run failed: {message}")))
        }
        "done" => Ok(RunSignal::Done),
        _ => Ok(RunSignal::Ignored),
    }
}

fn parse_data<'a, T: Deserialize<'a>>(event_type: &str, data: &'a str) -> Result<T, AssistantError> {
    serde_json::from_str(data).map_err(|e| {
        AssistantError::stream(format!("Failed to parse {event_type}: {e}"))
    })
}

/// Only the first content part is rendered; it must be text
fn first_text_part(content: Vec<WireContentPart>) -> Option<WireText> {
    let first = content.into_iter().next()?;
    if first.kind == "text" {
        first.text
    } else {
        None
    }
}

fn to_annotations(annotations: Option<Vec<WireAnnotation>>) -> Vec<Annotation> {
    annotations
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, a)| Annotation {
            index: a.index.unwrap_or(position),
            file_citation: a.file_citation.map(|f| f.file_id),
        })
        .collect()
}

// Assistant API wire types

#[derive(Debug, Deserialize)]
struct WireMessageDelta {
    delta: WireDeltaBody,
}

#[derive(Debug, Deserialize)]
struct WireDeltaBody {
    #[serde(default)]
    content: Vec<WireContentPart>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Vec<WireContentPart>,
}

#[derive(Debug, Deserialize)]
struct WireContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    #[serde(default)]
    value: String,
    #[serde(default)]
    annotations: Option<Vec<WireAnnotation>>,
}

#[derive(Debug, Deserialize)]
struct WireAnnotation {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    file_citation: Option<WireFileRef>,
}

#[derive(Debug, Deserialize)]
struct WireFileRef {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct WireRunStep {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: Option<String>,
}
