use relay_core::{scan_directives, Directive, DEFAULT_WORD_LIMIT};
use relay_logging::{relay_info, relay_warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::preview::{text_preview, STORE_PREVIEW_CHARS};
use crate::retrieve::ContentRetriever;
use crate::FetchError;

/// What to do when one directive cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewritePolicy {
    /// Keep the directive text and append an inline error marker.
    #[default]
    Annotate,
    /// Stop at the first failure and hand it to the caller.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{directive} could not be resolved: {error}")]
pub struct DirectiveFailure {
    pub directive: String,
    pub error: FetchError,
}

/// Replaces `[include-url: ...]` directives with the text of the page they name.
#[derive(Clone)]
pub struct CommandRewriter {
    retriever: ContentRetriever,
    word_limit: usize,
}

impl CommandRewriter {
    pub fn new(retriever: ContentRetriever) -> Self {
        Self::with_word_limit(retriever, DEFAULT_WORD_LIMIT)
    }

    pub fn with_word_limit(retriever: ContentRetriever, word_limit: usize) -> Self {
        Self {
            retriever,
            word_limit,
        }
    }

    /// Resolve every directive, annotating failures inline. Never fails.
    pub async fn resolve(&self, text: &str) -> String {
        self.resolve_annotated(text, &CancellationToken::new()).await
    }

    pub async fn resolve_annotated(&self, text: &str, cancel: &CancellationToken) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for found in scan_directives(text) {
            out.push_str(&text[cursor..found.range.start]);
            match self.resolve_directive(&found.directive, cancel).await {
                Ok(content) => out.push_str(&content),
                Err(err) => out.push_str(&annotate(&found.directive.raw, &err)),
            }
            cursor = found.range.end;
        }
        out.push_str(&text[cursor..]);
        out
    }

    /// Resolve every directive, stopping at the first one that fails.
    pub async fn resolve_strict(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DirectiveFailure> {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for found in scan_directives(text) {
            out.push_str(&text[cursor..found.range.start]);
            let content = self
                .resolve_directive(&found.directive, cancel)
                .await
                .map_err(|error| DirectiveFailure {
                    directive: found.directive.raw.clone(),
                    error,
                })?;
            out.push_str(&content);
            cursor = found.range.end;
        }
        out.push_str(&text[cursor..]);
        Ok(out)
    }

    pub async fn resolve_with_policy(
        &self,
        text: &str,
        policy: RewritePolicy,
        cancel: &CancellationToken,
    ) -> Result<String, DirectiveFailure> {
        match policy {
            RewritePolicy::Annotate => Ok(self.resolve_annotated(text, cancel).await),
            RewritePolicy::Abort => self.resolve_strict(text, cancel).await,
        }
    }

    async fn resolve_directive(
        &self,
        directive: &Directive,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let request = directive.fetch_request(self.word_limit)?;
        let extracted = match self.retriever.retrieve(&request, cancel).await {
            Ok(extracted) => extracted,
            Err(err) => {
                relay_warn!("Directive for {} failed: {}", directive.url, err);
                return Err(err);
            }
        };
        if directive.store {
            relay_info!(
                "Storing content from {} (first {} characters): {}",
                directive.url,
                STORE_PREVIEW_CHARS,
                text_preview(&extracted.text, STORE_PREVIEW_CHARS)
            );
        }
        Ok(extracted.text)
    }
}

fn annotate(raw: &str, err: &FetchError) -> String {
    format!("{raw} [error: {err}]")
}
