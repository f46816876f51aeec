//! Relay engine: resilient fetching, content extraction, directive rewriting
//! and streamed generation.
mod decode;
mod engine;
mod extract;
mod fetch;
mod frame;
mod preview;
mod relay;
mod retrieve;
mod rewrite;
mod stream;
mod types;

pub use decode::{decode_body, DecodedText};
pub use engine::EngineHandle;
pub use extract::{BodyTextExtractor, ExtractedText, TextExtractor, TRUNCATION_MARKER};
pub use fetch::{backoff_delay, FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_USER_AGENT};
pub use frame::{Frame, FrameDecoder, FrameTooLarge, DEFAULT_MAX_FRAME_BYTES};
pub use preview::{text_preview, STORE_PREVIEW_CHARS};
pub use relay::ChatRelay;
pub use retrieve::{ContentRetriever, FetchResult};
pub use rewrite::{CommandRewriter, DirectiveFailure, RewritePolicy};
pub use stream::{GenerationParams, StreamSession, StreamSettings, StreamingTokenClient, TokenSink};
pub use types::{EngineEvent, ExchangeId, FailureKind, FetchError, FetchMetadata, FetchOutput};
