use std::fmt;

/// Final outcome of one streaming exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    Done,
    Canceled,
    Failed { message: String },
}

impl TerminalState {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalState::Done => write!(f, "done"),
            TerminalState::Canceled => write!(f, "stopped"),
            TerminalState::Failed { message } => write!(f, "error: {message}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CompletionState {
    #[default]
    Pending,
    Terminal(TerminalState),
}

impl CompletionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompletionState::Terminal(_))
    }

    /// Moves to `terminal` unless a terminal state was already reached.
    /// Returns whether the transition happened.
    pub fn finish(&mut self, terminal: TerminalState) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self = CompletionState::Terminal(terminal);
        true
    }

    pub fn terminal(&self) -> Option<&TerminalState> {
        match self {
            CompletionState::Pending => None,
            CompletionState::Terminal(state) => Some(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CompletionState, TerminalState};

    #[test]
    fn first_terminal_state_wins() {
        let mut state = CompletionState::default();
        assert!(state.finish(TerminalState::Canceled));
        assert!(!state.finish(TerminalState::Done));
        assert_eq!(state.terminal(), Some(&TerminalState::Canceled));
    }

    #[test]
    fn stopped_and_error_render_differently() {
        assert_eq!(TerminalState::Canceled.to_string(), "stopped");
        assert_eq!(TerminalState::failed("boom").to_string(), "error: boom");
    }
}
