//! Streaming completions against a local OpenAI-style endpoint.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::routing::post;
use axum::Router;
use futures_util::stream;
use tokio::net::TcpListener;

use webrag_backend::llm::{ChatMessage, ChatRequest, LlmProvider, OpenAiCompatProvider};

/// Serves `chunks` as separate body frames with a pause between them.
async fn spawn_stream_server(chunks: Vec<Vec<u8>>) -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let chunks = chunks.clone();
            async move {
                let body = stream::unfold(chunks.into_iter(), |mut rest| async move {
                    let chunk = rest.next()?;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Some((Ok::<_, Infallible>(chunk), rest))
                });
                Body::from_stream(body)
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

async fn collect(provider: &OpenAiCompatProvider) -> String {
    let request = ChatRequest::new(vec![ChatMessage::user("Say hello")]);
    let mut rx = provider
        .stream_chat(request, "test-model")
        .await
        .expect("stream");

    let mut out = String::new();
    while let Some(token) = rx.recv().await {
        out.push_str(&token.expect("token"));
    }
    out
}

#[tokio::test]
async fn multibyte_text_split_across_frames_is_decoded_whole() {
    let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"h\u{e9}llo\"}}]}\n\ndata: [DONE]\n\n";
    let bytes = payload.as_bytes().to_vec();
    let split = bytes.iter().position(|&b| b == 0xC3).expect("multibyte char") + 1;

    let base_url =
        spawn_stream_server(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;
    let provider = OpenAiCompatProvider::new(base_url, None, Duration::from_secs(5)).expect("provider");

    assert_eq!(collect(&provider).await, "h\u{e9}llo");
}

#[tokio::test]
async fn deltas_are_concatenated_until_done() {
    let payload = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\", world\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
    );
    let base_url = spawn_stream_server(vec![payload.as_bytes().to_vec()]).await;
    let provider = OpenAiCompatProvider::new(base_url, None, Duration::from_secs(5)).expect("provider");

    assert_eq!(collect(&provider).await, "Hello, world");
}
