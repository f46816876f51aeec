use std::sync::Arc;

use relay_core::FetchRequest;
use relay_logging::relay_info;
use tokio_util::sync::CancellationToken;

use crate::decode::decode_body;
use crate::extract::{ExtractedText, TextExtractor};
use crate::fetch::Fetcher;
use crate::FetchError;

/// Outcome of fetching and extracting one resource.
pub type FetchResult = Result<ExtractedText, FetchError>;

/// Fetch -> decode -> extract for a single [`FetchRequest`].
#[derive(Clone)]
pub struct ContentRetriever {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn TextExtractor>,
}

impl ContentRetriever {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { fetcher, extractor }
    }

    pub async fn retrieve(&self, request: &FetchRequest, cancel: &CancellationToken) -> FetchResult {
        let output = self.fetcher.fetch(request, cancel).await?;
        let decoded = decode_body(&output.bytes, output.metadata.content_type.as_deref());
        let extracted =
            self.extractor
                .extract(&decoded.text, request.filter_markup(), request.word_limit());
        relay_info!(
            "Extracted {} characters of text from {} ({}, truncated={})",
            extracted.text.chars().count(),
            output.metadata.final_url,
            decoded.encoding_label,
            extracted.truncated
        );
        Ok(extracted)
    }
}
