use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::ApiError;

/// Client for servers speaking the OpenAI `/v1` chat and embeddings protocol
/// (OpenAI itself, LM Studio, Ollama, vLLM).
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        // Accept base urls configured either with or without the `/v1` suffix.
        if self.base_url.ends_with("/v1") {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/v1{}", self.base_url, path)
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn chat_body(request: &ChatRequest, model_id: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.top_p { obj.insert("top_p".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
            if let Some(s) = &request.stop { obj.insert("stop".to_string(), json!(s)); }
        }

        body
    }
}

/// One decoded line of a streamed completion.
#[derive(Debug, PartialEq)]
pub(crate) enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

pub(crate) fn parse_stream_line(line: &str) -> StreamLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return StreamLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return StreamLine::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(json) => match json["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => StreamLine::Delta(content.to_string()),
            _ => StreamLine::Skip,
        },
        Err(_) => StreamLine::Skip,
    }
}

/// Reassembles newline-terminated lines from raw network chunks. Lines are
/// decoded only once complete, so a character split across chunks survives.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub(crate) fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever trails the last newline.
    pub(crate) fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let res = self
            .authorize(self.client.get(self.endpoint("/models")))
            .send()
            .await;
        match res {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let body = Self::chat_body(&request, model_id, false);

        let res = self
            .authorize(self.client.post(self.endpoint("/chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("chat error {}: {}", status, text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let body = Self::chat_body(&request, model_id, true);

        let res = self
            .authorize(self.client.post(self.endpoint("/chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("stream error {}: {}", status, text)));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut lines = LineBuffer::default();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        lines.push(&bytes);
                        while let Some(line) = lines.next_line() {
                            match parse_stream_line(&line) {
                                StreamLine::Delta(content) => {
                                    if tx.send(Ok(content)).await.is_err() {
                                        return;
                                    }
                                }
                                StreamLine::Done => return,
                                StreamLine::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::upstream(e))).await;
                        return;
                    }
                }
            }
            if let StreamLine::Delta(content) = parse_stream_line(&lines.finish()) {
                let _ = tx.send(Ok(content)).await;
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .authorize(self.client.post(self.endpoint("/embeddings")))
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("embed error {}: {}", status, text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Upstream(format!(
                "embedding count mismatch: sent {}, received {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_handles_base_url_with_and_without_v1() {
        let timeout = Duration::from_secs(5);
        let bare = OpenAiCompatProvider::new("http://localhost:1234/".to_string(), None, timeout)
            .expect("provider");
        let versioned =
            OpenAiCompatProvider::new("http://localhost:11434/v1".to_string(), None, timeout)
                .expect("provider");

        assert_eq!(bare.endpoint("/embeddings"), "http://localhost:1234/v1/embeddings");
        assert_eq!(
            versioned.endpoint("/chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn parses_stream_lines() {
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            StreamLine::Delta("Hel".to_string())
        );
        assert_eq!(parse_stream_line("data: [DONE]"), StreamLine::Done);
        assert_eq!(parse_stream_line(": keep-alive"), StreamLine::Skip);
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            StreamLine::Skip
        );
    }

    #[test]
    fn split_codepoints_survive_chunk_boundaries() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"h\u{e9}llo\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).expect("multibyte char") + 1;

        let mut lines = LineBuffer::default();
        lines.push(&line[..split]);
        assert_eq!(lines.next_line(), None);
        lines.push(&line[split..]);

        let decoded = lines.next_line().expect("complete line");
        assert_eq!(parse_stream_line(&decoded), StreamLine::Delta("h\u{e9}llo".to_string()));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.finish(), "");
    }

    #[test]
    fn unterminated_tail_is_kept_for_the_end() {
        let mut lines = LineBuffer::default();
        lines.push(b"data: [DONE]\n: ping");
        assert_eq!(lines.next_line().as_deref(), Some("data: [DONE]\n"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.finish(), ": ping");
    }

    #[test]
    fn empty_api_key_is_treated_as_absent() {
        let provider = OpenAiCompatProvider::new(
            "http://localhost:1234".to_string(),
            Some("  ".to_string()),
            Duration::from_secs(5),
        )
        .expect("provider");
        assert!(provider.api_key.is_none());
    }
}
