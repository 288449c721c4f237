use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::managers::BroadcastChannelManager;

use super::routes::HttpServerError;

pub type EventStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Server-Sent Events stream of presentation snapshots.
pub fn presentation(broadcasts: &BroadcastChannelManager) -> Result<EventStream, HttpServerError> {
    let receiver = broadcasts
        .subscribe_presentation()
        .ok_or(HttpServerError::ServiceUnavailable(
            "presentation channel not initialized",
        ))?;
    Ok(stream_of(receiver, "presentation"))
}

/// Server-Sent Events stream of detected strums.
pub fn strums(broadcasts: &BroadcastChannelManager) -> Result<EventStream, HttpServerError> {
    let receiver = broadcasts
        .subscribe_strum_events()
        .ok_or(HttpServerError::ServiceUnavailable(
            "strum channel not initialized",
        ))?;
    Ok(stream_of(receiver, "strum"))
}

/// Server-Sent Events stream of every telemetry event as it is published.
pub fn telemetry() -> EventStream {
    stream_of(crate::telemetry::hub().subscribe(), "metric")
}

fn stream_of<T>(receiver: broadcast::Receiver<T>, name: &'static str) -> EventStream
where
    T: Serialize + Clone + Send + 'static,
{
    // Lagged receivers skip ahead; snapshots are superseded anyway.
    let stream = BroadcastStream::new(receiver).filter_map(move |result| async move {
        match result {
            Ok(value) => match serde_json::to_string(&value) {
                Ok(payload) => Some(Ok(Event::default().event(name).data(payload))),
                Err(_) => None,
            },
            Err(_) => None,
        }
    });

    Sse::new(Box::pin(stream) as Pin<Box<_>>).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("debug-keepalive"),
    )
}
