//! Server-Sent Events for chat replies

use crate::chat::ChatEvent;
use crate::transcript::TurnUpdate;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Convert a chat reply channel to an SSE stream
///
/// The stream ends when the run's final event has been sent. Dropping the
/// response (client disconnect) drops the receiver, which abandons the run.
pub fn sse_stream(
    rx: mpsc::UnboundedReceiver<ChatEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = UnboundedReceiverStream::new(rx).map(|event| Ok(chat_event_to_axum(&event)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// SSE event name for a chat event
pub fn event_name(event: &ChatEvent) -> &'static str {
    match event {
        ChatEvent::TurnStarted { .. } => "turn_started",
        ChatEvent::Update { update } => match update {
            TurnUpdate::BlockOpened { .. } => "block_opened",
            TurnUpdate::Text { .. } => "text",
            TurnUpdate::BlockAppended { .. } => "block_appended",
            TurnUpdate::BlockClosed { .. } => "block_closed",
        },
        ChatEvent::Done { .. } => "done",
        ChatEvent::Interrupted { .. } => "interrupted",
    }
}

fn chat_event_to_axum(event: &ChatEvent) -> Event {
    // Updates go out flat so the UI reads `index`/`fragment` directly
    let data = match event {
        ChatEvent::Update { update } => serde_json::to_string(update),
        other => serde_json::to_string(other),
    }
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize chat event");
        "{}".to_string()
    });

    Event::default().event(event_name(event)).data(data)
}
