use std::time::Duration;

use futures_util::StreamExt;
use relay_core::{ChatMessage, CompletionState, TerminalState};
use relay_logging::{relay_debug, relay_info, relay_trace, relay_warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::frame::{Frame, FrameDecoder, DEFAULT_MAX_FRAME_BYTES};
use crate::{FailureKind, FetchError};

const EVENT_STREAM: &str = "text/event-stream";

/// Sampling parameters forwarded untouched to the generation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 1000,
            top_p: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub endpoint: Url,
    pub connect_timeout: Duration,
    pub generation: GenerationParams,
    /// Largest single event frame accepted before the stream is failed.
    pub max_frame_bytes: usize,
}

impl StreamSettings {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            connect_timeout: Duration::from_secs(10),
            generation: GenerationParams::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Receives streamed tokens in arrival order.
pub trait TokenSink: Send {
    fn on_token(&mut self, token: &str);
}

impl<F> TokenSink for F
where
    F: FnMut(&str) + Send,
{
    fn on_token(&mut self, token: &str) {
        self(token)
    }
}

/// One in-flight generation call: an immutable conversation snapshot plus
/// the caller's cancellation handle. Records the terminal state reached by
/// [`StreamingTokenClient::send`]; a finished session is never sent again.
#[derive(Debug)]
pub struct StreamSession {
    conversation: Vec<ChatMessage>,
    cancel: CancellationToken,
    state: CompletionState,
}

impl StreamSession {
    pub fn new(conversation: Vec<ChatMessage>) -> Self {
        Self::with_cancel(conversation, CancellationToken::new())
    }

    pub fn with_cancel(conversation: Vec<ChatMessage>, cancel: CancellationToken) -> Self {
        Self {
            conversation,
            cancel,
            state: CompletionState::Pending,
        }
    }

    /// Handle the caller keeps to stop the stream from elsewhere.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn state(&self) -> &CompletionState {
        &self.state
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    #[serde(flatten)]
    generation: GenerationParams,
}

#[derive(Debug, Clone)]
pub struct StreamingTokenClient {
    settings: StreamSettings,
    client: reqwest::Client,
}

impl StreamingTokenClient {
    pub fn new(settings: StreamSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self::with_client(settings, client))
    }

    /// Share an existing connection pool.
    pub fn with_client(settings: StreamSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    /// Stream a reply for `session`, handing each non-empty delta to `sink`.
    ///
    /// Returns exactly one terminal state. Tokens already delivered are left
    /// with the caller whatever the outcome. A session that already finished
    /// is not sent again; its recorded state is returned as is.
    pub async fn send(&self, session: &mut StreamSession, sink: &mut dyn TokenSink) -> TerminalState {
        if let Some(terminal) = session.state.terminal() {
            relay_warn!("Refusing to resend a finished session ({})", terminal);
            return terminal.clone();
        }
        let terminal = self.run(session, sink).await;
        session.state.finish(terminal.clone());
        match &terminal {
            TerminalState::Done => relay_info!("Generation stream completed"),
            TerminalState::Canceled => relay_info!("Generation stream cancelled by caller"),
            TerminalState::Failed { message } => relay_warn!("Generation stream failed: {}", message),
        }
        terminal
    }

    async fn run(&self, session: &StreamSession, sink: &mut dyn TokenSink) -> TerminalState {
        let cancel = &session.cancel;
        if cancel.is_cancelled() {
            return TerminalState::Canceled;
        }

        let body = match serde_json::to_vec(&ChatRequest {
            messages: &session.conversation,
            generation: self.settings.generation,
        }) {
            Ok(body) => body,
            Err(err) => return TerminalState::failed(format!("failed to encode request: {err}")),
        };

        relay_debug!(
            "Opening generation stream to {} with {} messages",
            self.settings.endpoint,
            session.conversation.len()
        );
        let request = self
            .client
            .post(self.settings.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, EVENT_STREAM)
            .body(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TerminalState::Canceled,
            result = request => match result {
                Ok(response) => response,
                Err(err) => return TerminalState::failed(format!("request failed: {err}")),
            },
        };

        let status = response.status();
        if !status.is_success() {
            let detail = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TerminalState::Canceled,
                text = response.text() => text.unwrap_or_default(),
            };
            return TerminalState::failed(format!(
                "generation endpoint returned {status}: {}",
                detail.trim()
            ));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = FrameDecoder::with_max_frame_bytes(self.settings.max_frame_bytes);
        let mut server_error = None;
        loop {
            // Dropping the pending read on cancellation closes the connection.
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TerminalState::Canceled,
                next = stream.next() => next,
            };

            let (frames, ended) = match next {
                Some(Ok(chunk)) => match decoder.push(&chunk) {
                    Ok(frames) => (frames, false),
                    Err(err) => return TerminalState::failed(err.to_string()),
                },
                Some(Err(err)) => return TerminalState::failed(format!("stream interrupted: {err}")),
                None => (decoder.finish().into_iter().collect(), true),
            };

            for frame in frames {
                if cancel.is_cancelled() {
                    return TerminalState::Canceled;
                }
                match frame {
                    Frame::Delta(content) if content.is_empty() => {}
                    Frame::Delta(content) => sink.on_token(&content),
                    Frame::Done => return TerminalState::Done,
                    Frame::ServerError(message) => {
                        relay_warn!("Generation endpoint reported an error: {}", message);
                        server_error = Some(message);
                    }
                    Frame::Malformed(reason) => relay_warn!("Skipping malformed frame: {}", reason),
                    Frame::Ignored => relay_trace!("Ignoring frame without data"),
                }
            }

            if ended {
                let message = match server_error {
                    Some(error) => format!("stream ended before completion: {error}"),
                    None => "stream ended before completion".to_string(),
                };
                return TerminalState::failed(message);
            }
        }
    }
}
