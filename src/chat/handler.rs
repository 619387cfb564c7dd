use serde::Serialize;
use tokio::sync::mpsc;

use super::events::ChatEvent;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, LlmService};
use crate::webrag::WebRagOrchestrator;

const DIRECT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer clearly and concisely.";

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRoute {
    WebRag,
    Direct,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleAnswer {
    pub answer: String,
    pub used_web_search: bool,
}

/// Decides per question whether to go through web search, then produces
/// either a full answer or a stream of [`ChatEvent`]s.
#[derive(Clone)]
pub struct ChatHandler {
    llm: LlmService,
    orchestrator: WebRagOrchestrator,
    router_enabled: bool,
    chunk_chars: usize,
}

impl ChatHandler {
    pub fn new(
        llm: LlmService,
        orchestrator: WebRagOrchestrator,
        router_enabled: bool,
        chunk_chars: usize,
    ) -> Self {
        Self {
            llm,
            orchestrator,
            router_enabled,
            chunk_chars: chunk_chars.max(1),
        }
    }

    /// Asks the model whether the question needs a web search. A failed
    /// router call answers directly.
    pub async fn route(&self, question: &str) -> ChatRoute {
        if !self.router_enabled {
            return ChatRoute::WebRag;
        }

        match self.llm.complete(&router_prompt(question)).await {
            Ok(reply) => {
                let route = parse_route(&reply);
                tracing::info!("Router chose {:?} (reply: {:?})", route, reply.trim());
                route
            }
            Err(err) => {
                tracing::warn!("Router call failed, answering directly: {}", err);
                ChatRoute::Direct
            }
        }
    }

    pub async fn answer(&self, question: &str) -> Result<SimpleAnswer, ApiError> {
        match self.route(question).await {
            ChatRoute::WebRag => Ok(SimpleAnswer {
                answer: self.orchestrator.answer(question).await,
                used_web_search: true,
            }),
            ChatRoute::Direct => {
                let answer = self.llm.complete_messages(direct_messages(question)).await?;
                Ok(SimpleAnswer {
                    answer,
                    used_web_search: false,
                })
            }
        }
    }

    /// Spawns the reply and hands back its events. The stream always ends
    /// with [`ChatEvent::Complete`] unless the receiver goes away first.
    pub fn stream(&self, question: String) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handler = self.clone();

        tokio::spawn(async move {
            if tx.send(ChatEvent::Started).await.is_err() {
                return;
            }

            let delivered = match handler.route(&question).await {
                ChatRoute::WebRag => handler.stream_webrag(&question, &tx).await,
                ChatRoute::Direct => handler.stream_direct(&question, &tx).await,
            };

            if delivered {
                let _ = tx.send(ChatEvent::Complete).await;
            } else {
                tracing::debug!("Chat client went away before the reply finished");
            }
        });

        rx
    }

    /// Returns false once the client has disconnected.
    async fn stream_webrag(&self, question: &str, tx: &mpsc::Sender<ChatEvent>) -> bool {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let orchestrator = self.orchestrator.clone();

        let run = async move {
            orchestrator
                .answer_with_progress(question, Some(&progress_tx))
                .await
        };
        let forward = async {
            let mut connected = true;
            while let Some(event) = progress_rx.recv().await {
                if connected && tx.send(ChatEvent::Progress(event)).await.is_err() {
                    connected = false;
                }
            }
            connected
        };

        let (answer, connected) = tokio::join!(run, forward);
        if !connected {
            return false;
        }

        for piece in split_chars(&answer, self.chunk_chars) {
            if tx.send(ChatEvent::Token(piece)).await.is_err() {
                return false;
            }
        }
        true
    }

    async fn stream_direct(&self, question: &str, tx: &mpsc::Sender<ChatEvent>) -> bool {
        let mut tokens = match self.llm.stream_complete(direct_messages(question)).await {
            Ok(tokens) => tokens,
            Err(err) => {
                tracing::error!("Direct completion failed to start: {}", err);
                return tx.send(ChatEvent::Error(err.to_string())).await.is_ok();
            }
        };

        while let Some(item) = tokens.recv().await {
            let event = match item {
                Ok(token) => ChatEvent::Token(token),
                Err(err) => {
                    tracing::error!("Direct completion stream failed: {}", err);
                    return tx.send(ChatEvent::Error(err.to_string())).await.is_ok();
                }
            };
            if tx.send(event).await.is_err() {
                return false;
            }
        }
        true
    }
}

fn router_prompt(question: &str) -> String {
    format!(
        "Decide whether answering the question below requires searching the web for \
         current or factual information. Reply with only \"yes\" or \"no\".\n\n\
         Question: {question}"
    )
}

fn parse_route(reply: &str) -> ChatRoute {
    if reply.trim().to_lowercase().contains("yes") {
        ChatRoute::WebRag
    } else {
        ChatRoute::Direct
    }
}

fn direct_messages(question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(DIRECT_SYSTEM_PROMPT),
        ChatMessage::user(question),
    ]
}

/// Splits on char boundaries into pieces of at most `size` chars.
pub fn split_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_parsing_is_case_and_whitespace_insensitive() {
        assert_eq!(parse_route("  YES\n"), ChatRoute::WebRag);
        assert_eq!(parse_route("Yes, it does."), ChatRoute::WebRag);
        assert_eq!(parse_route("no"), ChatRoute::Direct);
        assert_eq!(parse_route(""), ChatRoute::Direct);
    }

    #[test]
    fn split_chars_respects_multibyte_text() {
        assert_eq!(split_chars("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(split_chars("héllo wörld", 4), vec!["héll", "o wö", "rld"]);
        assert!(split_chars("", 5).is_empty());
        assert_eq!(split_chars("ab", 0), vec!["a", "b"]);
    }

    #[test]
    fn router_prompt_asks_for_yes_or_no() {
        let prompt = router_prompt("Who won yesterday's match?");
        assert!(prompt.contains("\"yes\" or \"no\""));
        assert!(prompt.ends_with("Question: Who won yesterday's match?"));
    }
}
