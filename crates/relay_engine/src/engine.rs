use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use relay_core::{ChatMessage, TerminalState};
use relay_logging::relay_info;
use tokio_util::sync::CancellationToken;

use crate::relay::ChatRelay;
use crate::stream::TokenSink;
use crate::{EngineEvent, ExchangeId};

enum EngineCommand {
    Submit {
        exchange_id: ExchangeId,
        history: Vec<ChatMessage>,
        text: String,
        cancel: CancellationToken,
    },
}

/// Runs exchanges on a background tokio runtime and reports progress as
/// [`EngineEvent`]s. Exchanges run concurrently and never share state.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(relay: ChatRelay) -> io::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let relay = Arc::new(relay);

        thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                let relay = relay.clone();
                let event_tx = event_tx.clone();
                runtime.spawn(async move {
                    handle_command(relay.as_ref(), command, event_tx).await;
                });
            }
        });

        Ok(Self { cmd_tx, event_rx })
    }

    /// Submit user `text` as the next message after `history`.
    ///
    /// The returned token cancels this exchange only.
    pub fn submit(
        &self,
        exchange_id: ExchangeId,
        history: Vec<ChatMessage>,
        text: impl Into<String>,
    ) -> CancellationToken {
        let cancel = CancellationToken::new();
        let _ = self.cmd_tx.send(EngineCommand::Submit {
            exchange_id,
            history,
            text: text.into(),
            cancel: cancel.clone(),
        });
        cancel
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

struct ChannelTokenSink {
    exchange_id: ExchangeId,
    tx: mpsc::Sender<EngineEvent>,
}

impl TokenSink for ChannelTokenSink {
    fn on_token(&mut self, token: &str) {
        let _ = self.tx.send(EngineEvent::Token {
            exchange_id: self.exchange_id,
            token: token.to_string(),
        });
    }
}

async fn handle_command(relay: &ChatRelay, command: EngineCommand, event_tx: mpsc::Sender<EngineEvent>) {
    match command {
        EngineCommand::Submit {
            exchange_id,
            mut history,
            text,
            cancel,
        } => {
            relay_info!("Exchange {} submitted", exchange_id);
            let state = match relay.prepare(&text, &cancel).await {
                Ok(resolved) => {
                    let _ = event_tx.send(EngineEvent::Resolved {
                        exchange_id,
                        text: resolved.clone(),
                    });
                    history.push(ChatMessage::user(resolved));
                    let mut sink = ChannelTokenSink {
                        exchange_id,
                        tx: event_tx.clone(),
                    };
                    relay.stream(history, &mut sink, cancel).await
                }
                Err(state) => state,
            };
            finish(&event_tx, exchange_id, state);
        }
    }
}

fn finish(event_tx: &mpsc::Sender<EngineEvent>, exchange_id: ExchangeId, state: TerminalState) {
    relay_info!("Exchange {} finished: {}", exchange_id, state);
    let _ = event_tx.send(EngineEvent::Finished { exchange_id, state });
}
