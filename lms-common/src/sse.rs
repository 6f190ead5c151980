//! Server-Sent Events (SSE) utilities

use crate::events::LmsEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Heartbeat interval for every SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Build an SSE stream from an EventBus receiver, forwarding only events
/// accepted by `filter`
///
/// The first message is always a `ConnectionStatus: connected` event.
/// A lagging receiver skips the dropped events and keeps streaming.
///
/// # Example
/// ```rust,ignore
/// let rx = state.event_bus.subscribe();
/// lms_common::sse::filtered_event_stream("notifications", rx, move |e| e.user_id() == Some(me))
/// ```
pub fn filtered_event_stream<F>(
    stream_name: &'static str,
    mut rx: broadcast::Receiver<LmsEvent>,
    filter: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: Fn(&LmsEvent) -> bool + Send + 'static,
{
    info!("New SSE client connected to {} events", stream_name);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !filter(&event) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(data) => {
                            debug!("SSE: {} -> {}", stream_name, event.event_type());
                            yield Ok(Event::default().event(event.event_type()).data(data));
                        }
                        Err(e) => warn!("SSE: failed to serialize event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: {} subscriber lagged, skipped {} events", stream_name, skipped);
                }
                Err(RecvError::Closed) => {
                    info!("SSE: {} event bus closed", stream_name);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"))
}
