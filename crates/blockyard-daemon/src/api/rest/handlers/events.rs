//! Run event streaming handler

use crate::api::rest::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use std::time::Duration;

/// Stream run events via SSE: `init`, then `run-update` and `run-log`
pub async fn stream_runs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.runs.subscribe().await;

    // Dropping the stream on disconnect drops the subscription with it
    let stream = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        let sse_event = match event.payload() {
            Ok(payload) => Event::default().event(event.name()).data(payload.to_string()),
            Err(e) => {
                tracing::warn!(event = event.name(), error = %e, "Failed to encode run event");
                Event::default().comment("encoding error")
            }
        };
        Some((Ok(sse_event), subscription))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
