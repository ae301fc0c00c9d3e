//! Server-Sent Events support

use super::types::FragmentPayload;
use crate::runtime::StreamItem;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Convert a run's stream into SSE, terminated by a `done` event
pub fn sse_stream(
    run_id: String,
    rx: mpsc::Receiver<StreamItem>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let items = ReceiverStream::new(rx).filter_map(move |item| match stream_item_to_axum(&item) {
        Ok(event) => Some(Ok(event)),
        Err(e) => {
            tracing::warn!(run_id = %run_id, error = %e, "Skipping unserializable stream item");
            None
        }
    });
    let done = futures::stream::once(async {
        Ok(Event::default().event("done").data("stream complete"))
    });

    Sse::new(items.chain(done)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn stream_item_to_axum(item: &StreamItem) -> Result<Event, axum::Error> {
    match item {
        StreamItem::Fragment {
            participant,
            content,
        } => Event::default().json_data(FragmentPayload {
            content,
            participant: *participant,
        }),
        StreamItem::Failed { message } => Event::default()
            .event("error")
            .json_data(json!({ "message": message })),
    }
}
