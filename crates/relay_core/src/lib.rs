//! Relay core: pure data model for conversations, directives and fetch requests.
mod conversation;
mod directive;
mod request;
mod session;

pub use conversation::{ChatMessage, Conversation, ConversationError, Role};
pub use directive::{scan_directives, Directive, DirectiveMatch, DEFAULT_DIRECTIVE_BUDGET};
pub use request::{
    FetchOptions, FetchRequest, RequestError, DEFAULT_EXECUTION_BUDGET, DEFAULT_WORD_LIMIT,
};
pub use session::{CompletionState, TerminalState};
