//! SSE push channel for observer updates
//!
//! Bridges the hub's broadcast bus onto an axum SSE response. Each
//! connection gets the current live set first, then the mutation stream;
//! a reconnecting observer therefore recovers state without polling, and
//! replayed events are harmless (idempotent ids). Lagged observers lose
//! events rather than blocking the producer and converge again through
//! the polling fallback.

use crate::api::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = ctx.engine.hub().subscribe();
    let initial = ctx.engine.hub().snapshot().await;
    info!("New SSE observer connected");

    let stream = async_stream::stream! {
        // Current live set first, so late joiners start convergent
        if let Ok(event) = Event::default().event("live_set").json_data(&initial) {
            yield Ok(event);
        }

        loop {
            match rx.recv().await {
                Ok(geotag_event) => {
                    match Event::default()
                        .event(geotag_event.event_type())
                        .json_data(&geotag_event)
                    {
                        Ok(event) => yield Ok(event),
                        Err(e) => warn!("Failed to serialize SSE event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Slow observer: dropped events recover via polling
                    warn!("SSE observer lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
