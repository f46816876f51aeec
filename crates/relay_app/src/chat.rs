//! Interactive chat loop: one exchange per input line.

use std::future::Future;
use std::io::Write;

use relay_core::{ChatMessage, Conversation, TerminalState};
use relay_engine::ChatRelay;
use relay_logging::{relay_info, relay_warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio_util::sync::CancellationToken;

pub const HELP: &str = "Type a message and press Enter. Ctrl-C stops a reply in progress, or quits at the prompt.\n\
Commands: /retry (regenerate the last reply), /edit <text> (replace your last message), /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Retry,
    Edit(String),
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    match line.split_once(char::is_whitespace) {
        Some(("/edit", rest)) if !rest.trim().is_empty() => Command::Edit(rest.trim().to_string()),
        _ => match line {
            "/retry" => Command::Retry,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            _ => Command::Send(line.to_string()),
        },
    }
}

pub struct ChatLoop {
    relay: ChatRelay,
    conversation: Conversation,
}

impl ChatLoop {
    pub fn new(relay: ChatRelay) -> Self {
        Self {
            relay,
            conversation: Conversation::new(),
        }
    }

    pub async fn run<R>(&mut self, input: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        println!("{HELP}");
        let mut lines = input.lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = next_input(&mut lines, ctrl_c_pressed()).await? else {
                println!();
                break;
            };
            match parse_command(&line) {
                Command::Empty => {}
                Command::Help => println!("{HELP}"),
                Command::Quit => break,
                Command::Send(text) => self.send(&text).await,
                Command::Retry => self.retry().await,
                Command::Edit(text) => self.edit(&text).await,
            }
        }
        relay_info!("Chat loop finished after {} messages", self.conversation.len());
        Ok(())
    }

    async fn send(&mut self, text: &str) {
        let cancel = interrupt_token();
        let _watcher = cancel.clone().drop_guard();
        let prepared = match self.relay.prepare(text, &cancel).await {
            Ok(prepared) => prepared,
            Err(state) => return report(&state),
        };
        self.conversation.push_user(prepared);
        let snapshot = self.conversation.snapshot();
        self.stream(snapshot, cancel).await;
    }

    async fn retry(&mut self) {
        match self.conversation.retry() {
            Ok(snapshot) => {
                let cancel = interrupt_token();
                let _watcher = cancel.clone().drop_guard();
                self.stream(snapshot, cancel).await
            }
            Err(err) => println!("[{err}]"),
        }
    }

    async fn edit(&mut self, text: &str) {
        let Some(index) = self.conversation.last_user_index() else {
            return println!("[nothing to edit]");
        };
        let cancel = interrupt_token();
        let _watcher = cancel.clone().drop_guard();
        let prepared = match self.relay.prepare(text, &cancel).await {
            Ok(prepared) => prepared,
            Err(state) => return report(&state),
        };
        match self.conversation.edit(index, prepared) {
            Ok(snapshot) => self.stream(snapshot, cancel).await,
            Err(err) => println!("[{err}]"),
        }
    }

    async fn stream(&mut self, snapshot: Vec<ChatMessage>, cancel: CancellationToken) {
        let conversation = &mut self.conversation;
        let mut sink = |token: &str| {
            conversation.apply_token(token);
            print!("{token}");
            let _ = std::io::stdout().flush();
        };
        let state = self.relay.stream(snapshot, &mut sink, cancel).await;
        report(&state);
    }
}

/// Next input line, or `None` at end of input or once `interrupt` completes.
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        line = lines.next_line() => line,
        () = interrupt => Ok(None),
    }
}

/// Resolves on Ctrl-C. Listening for the signal replaces the default
/// handler, so the idle prompt has to treat it as a quit itself.
async fn ctrl_c_pressed() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        relay_warn!("Could not listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
}

/// A token cancelled by Ctrl-C. The watcher task ends once the token is
/// cancelled, so callers hold a drop guard for the exchange.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let watched = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = watched.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    relay_warn!("Could not listen for Ctrl-C: {}", err);
                    return;
                }
                watched.cancel();
            }
        }
    });
    cancel
}

fn report(state: &TerminalState) {
    match state {
        TerminalState::Done => println!(),
        other => println!("\n[{other}]"),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncBufReadExt;

    use super::{next_input, parse_command, Command};

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  "), Command::Empty);
        assert_eq!(parse_command("/retry"), Command::Retry);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/edit  better question "), Command::Edit("better question".into()));
        assert_eq!(parse_command("/help"), Command::Help);
    }

    #[test]
    fn everything_else_is_a_message() {
        assert_eq!(parse_command("hello there"), Command::Send("hello there".into()));
        assert_eq!(parse_command("/edit"), Command::Send("/edit".into()));
        assert_eq!(
            parse_command("[include-url: http://example.test]"),
            Command::Send("[include-url: http://example.test]".into())
        );
    }

    #[tokio::test]
    async fn interrupt_at_the_prompt_ends_input() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = tokio::io::BufReader::new(reader).lines();
        let line = next_input(&mut lines, async {}).await.unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn typed_line_is_returned_while_idle() {
        let input: &[u8] = b"hello\n";
        let mut lines = input.lines();
        let line = next_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(line, Some("hello".to_string()));
    }
}
