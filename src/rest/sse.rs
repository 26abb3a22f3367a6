//! Server-sent event rendering for bus payloads.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};

use crate::bus::Payload;

/// Render each payload as one SSE event named after its change kind
/// (`init`, `update`, `insert`) with the `{type, row}` JSON as data.
pub fn payload_stream<S>(
    payloads: S,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = Payload> + Send + 'static,
{
    let events = payloads.map(|payload| {
        let data = serde_json::to_string(&payload).unwrap_or_default();
        Ok(Event::default().event(payload.kind()).data(data))
    });
    Sse::new(events).keep_alive(KeepAlive::new().interval(keep_alive))
}
