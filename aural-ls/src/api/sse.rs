//! Server-Sent Events for labeling and training progress
//!
//! GET /events streams every [`AuralEvent`]; `?vocab=<name>` restricts the
//! stream to one vocabulary (clip uploads are always included).

use crate::AppState;
use aural_common::events::AuralEvent;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct EventFilter {
    pub vocab: Option<String>,
}

fn wanted(event: &AuralEvent, filter: &EventFilter) -> bool {
    match (&filter.vocab, event.vocab_name()) {
        (Some(wanted), Some(vocab)) => wanted == vocab,
        _ => true,
    }
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(vocab = ?filter.vocab, "New SSE client connected");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !wanted(&event, &filter) {
                        continue;
                    }
                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!("SSE: Broadcasting event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => warn!("SSE: Failed to serialize event {}: {}", event_type, e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("SSE: Event stream ended");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_filter() {
        let now = chrono::Utc::now();
        let stored = AuralEvent::ClipStored {
            clip_id: "ab".into(),
            newly_stored: true,
            timestamp: now,
        };
        let intent = AuralEvent::IndexRebuilt {
            vocab_name: "intent".into(),
            clips: 1,
            timestamp: now,
        };

        let only_word = EventFilter {
            vocab: Some("word".into()),
        };
        assert!(wanted(&stored, &only_word));
        assert!(!wanted(&intent, &only_word));
        assert!(wanted(&intent, &EventFilter { vocab: None }));
    }
}
