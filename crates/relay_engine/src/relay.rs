use relay_core::{ChatMessage, TerminalState};
use relay_logging::relay_debug;
use tokio_util::sync::CancellationToken;

use crate::rewrite::{CommandRewriter, RewritePolicy};
use crate::stream::{StreamSession, StreamingTokenClient, TokenSink};

/// Directive resolution followed by a streamed reply.
#[derive(Clone)]
pub struct ChatRelay {
    rewriter: CommandRewriter,
    client: StreamingTokenClient,
    policy: RewritePolicy,
}

impl ChatRelay {
    pub fn new(rewriter: CommandRewriter, client: StreamingTokenClient, policy: RewritePolicy) -> Self {
        Self {
            rewriter,
            client,
            policy,
        }
    }

    pub fn policy(&self) -> RewritePolicy {
        self.policy
    }

    /// Produce the text actually sent upstream for user input `text`.
    pub async fn prepare(&self, text: &str, cancel: &CancellationToken) -> Result<String, TerminalState> {
        if cancel.is_cancelled() {
            return Err(TerminalState::Canceled);
        }
        let resolved = self
            .rewriter
            .resolve_with_policy(text, self.policy, cancel)
            .await
            .map_err(|failure| TerminalState::failed(failure.to_string()))?;
        // Directive fetches observe the same handle; a cancel during them stops here.
        if cancel.is_cancelled() {
            return Err(TerminalState::Canceled);
        }
        relay_debug!("Prepared message of {} characters", resolved.len());
        Ok(resolved)
    }

    /// Stream a reply to `conversation`, whose last message is the prepared user text.
    pub async fn stream(
        &self,
        conversation: Vec<ChatMessage>,
        sink: &mut dyn TokenSink,
        cancel: CancellationToken,
    ) -> TerminalState {
        let mut session = StreamSession::with_cancel(conversation, cancel);
        self.client.send(&mut session, sink).await
    }
}
