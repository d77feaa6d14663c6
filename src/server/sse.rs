//! OpenAI-style chat-completion-chunk streaming envelope.
//!
//! Pipelines push typed [`StreamEvent`]s through a bounded channel; this
//! module frames them as `data: <json>\n\n` Server-Sent-Event lines and
//! terminates every stream with `data: [DONE]`. The channel bound provides
//! backpressure when the client reads slowly; a dropped client closes the
//! channel, which producers observe as a failed send and abort.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Internal stream protocol shared by all pipelines.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Reasoning / progress text, rendered in the client's thinking box.
    Progress(String),
    /// User-visible answer text.
    Content(String),
    /// Terminal marker; exactly one per stream, nothing after it.
    Done,
}

/// The peer side of the channel is gone; the producer should stop.
#[derive(Debug)]
pub struct StreamClosed;

impl From<StreamClosed> for crate::core::errors::ApiError {
    fn from(_: StreamClosed) -> Self {
        crate::core::errors::ApiError::ClientGone
    }
}

/// Producer handle used by the pipelines. Pacing settings re-chunk long
/// documents for smooth display (legacy behavior, tunable).
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>, chunk_size: usize, chunk_delay: Duration) -> Self {
        Self {
            tx,
            chunk_size: chunk_size.max(1),
            chunk_delay,
        }
    }

    pub async fn progress(&self, text: impl Into<String>) -> Result<(), StreamClosed> {
        self.tx
            .send(StreamEvent::Progress(text.into()))
            .await
            .map_err(|_| StreamClosed)
    }

    pub async fn content(&self, text: impl Into<String>) -> Result<(), StreamClosed> {
        self.tx
            .send(StreamEvent::Content(text.into()))
            .await
            .map_err(|_| StreamClosed)
    }

    /// Emit a long text as small paced content chunks.
    pub async fn paced_content(&self, text: &str) -> Result<(), StreamClosed> {
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(self.chunk_size) {
            self.content(piece.iter().collect::<String>()).await?;
            tokio::time::sleep(self.chunk_delay).await;
        }
        Ok(())
    }

    /// Best effort: the stream may already be gone, which is fine.
    pub async fn done(&self) {
        let _ = self.tx.send(StreamEvent::Done).await;
    }
}

/// Build one SSE frame around a chat-completion-chunk payload.
fn frame(id: &str, created: i64, model: &str, delta: Value, finish_reason: Option<&str>) -> String {
    let payload = json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    });
    format!("data: {payload}\n\n")
}

fn event_frame(id: &str, created: i64, model: &str, event: &StreamEvent) -> String {
    match event {
        StreamEvent::Progress(text) => frame(
            id,
            created,
            model,
            json!({"role": "assistant", "reasoning_content": text}),
            None,
        ),
        StreamEvent::Content(text) => frame(id, created, model, json!({"content": text}), None),
        StreamEvent::Done => {
            let mut out = frame(id, created, model, json!({}), Some("stop"));
            out.push_str("data: [DONE]\n\n");
            out
        }
    }
}

/// Wrap an event receiver into a streaming HTTP response. Heartbeat frames
/// (empty delta) are inserted whenever the producer stays silent for
/// `heartbeat`, keeping intermediaries from closing the connection.
pub fn sse_response(
    model: String,
    mut rx: mpsc::Receiver<StreamEvent>,
    heartbeat: Duration,
) -> Response {
    let id = format!("chatcmpl-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
    let created = chrono::Utc::now().timestamp();

    let (frame_tx, frame_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = rx.recv() => event,
                _ = tokio::time::sleep(heartbeat) => {
                    let hb = frame(&id, created, &model, json!({}), None);
                    if frame_tx.send(hb).await.is_err() {
                        return;
                    }
                    continue;
                }
            };

            match event {
                Some(StreamEvent::Done) | None => {
                    // A producer that dies without Done still terminates cleanly.
                    let _ = frame_tx
                        .send(event_frame(&id, created, &model, &StreamEvent::Done))
                        .await;
                    return;
                }
                Some(event) => {
                    if frame_tx
                        .send(event_frame(&id, created, &model, &event))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    });

    let body_stream = futures_util::stream::unfold(frame_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_frames_carry_delta_content() {
        let out = event_frame("chatcmpl-1", 0, "btp", &StreamEvent::Content("salut".into()));
        assert!(out.starts_with("data: "));
        assert!(out.ends_with("\n\n"));
        let payload: Value = serde_json::from_str(out.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["choices"][0]["delta"]["content"], "salut");
        assert_eq!(payload["choices"][0]["finish_reason"], Value::Null);
        assert_eq!(payload["object"], "chat.completion.chunk");
    }

    #[test]
    fn progress_frames_use_reasoning_content() {
        let out = event_frame("chatcmpl-1", 0, "btp", &StreamEvent::Progress("think".into()));
        let payload: Value = serde_json::from_str(out.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["choices"][0]["delta"]["reasoning_content"], "think");
        assert_eq!(payload["choices"][0]["delta"]["role"], "assistant");
    }

    #[test]
    fn done_emits_stop_then_terminator() {
        let out = event_frame("chatcmpl-1", 0, "btp", &StreamEvent::Done);
        let frames: Vec<&str> = out.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 2);
        let payload: Value =
            serde_json::from_str(frames[0].trim_start_matches("data: ")).unwrap();
        assert_eq!(payload["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[1], "data: [DONE]");
    }

    #[tokio::test]
    async fn paced_content_splits_by_chunk_size() {
        let (tx, mut rx) = mpsc::channel(64);
        let sink = EventSink::new(tx, 5, Duration::from_millis(0));
        sink.paced_content("abcdefghij").await.unwrap();
        drop(sink);

        let mut pieces = Vec::new();
        while let Some(ev) = rx.recv().await {
            match ev {
                StreamEvent::Content(c) => pieces.push(c),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(pieces, vec!["abcde", "fghij"]);
    }

    #[tokio::test]
    async fn sink_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        let sink = EventSink::new(tx, 5, Duration::from_millis(0));
        drop(rx);
        assert!(sink.progress("x").await.is_err());
    }
}
