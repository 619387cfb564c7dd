use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Deserialize;

use crate::chat::ChatEvent;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub question: String,
}

impl ChatPayload {
    fn into_question(self) -> Result<String, ApiError> {
        let question = self.question.trim().to_string();
        if question.is_empty() {
            return Err(ApiError::BadRequest("question must not be empty".to_string()));
        }
        Ok(question)
    }
}

/// Streams the reply as `data: {json}` server-sent events.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatPayload>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let question = payload.into_question()?;
    tracing::info!("Chat request ({} chars)", question.chars().count());

    let events = state.chat.stream(question);
    let stream = stream::unfold((events, false), |(mut events, finished)| async move {
        if finished {
            return None;
        }
        let event: ChatEvent = events.recv().await?;
        let frame = Event::default().data(event.to_json().to_string());
        Some((Ok(frame), (events, event.is_terminal())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Whole answer in one JSON body.
pub async fn chat_simple(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let question = payload.into_question()?;
    let answer = state.chat.answer(&question).await?;
    Ok(Json(answer))
}
