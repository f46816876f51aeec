use std::time::Duration;

use url::Url;

pub const DEFAULT_EXECUTION_BUDGET: Duration = Duration::from_secs(60);
pub const DEFAULT_WORD_LIMIT: usize = 4_000;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("target url is empty")]
    EmptyUrl,
    #[error("invalid target url: {0}")]
    InvalidUrl(String),
    #[error("unsupported url scheme {0}")]
    UnsupportedScheme(String),
    #[error("execution budget must be greater than zero")]
    ZeroBudget,
    #[error("word limit must be greater than zero")]
    ZeroWordLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub execution_budget: Duration,
    pub filter_markup: bool,
    pub word_limit: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            execution_budget: DEFAULT_EXECUTION_BUDGET,
            filter_markup: false,
            word_limit: DEFAULT_WORD_LIMIT,
        }
    }
}

/// A validated, immutable description of one content retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    target: Url,
    options: FetchOptions,
}

impl FetchRequest {
    pub fn new(target: &str, options: FetchOptions) -> Result<Self, RequestError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(RequestError::EmptyUrl);
        }
        let url = Url::parse(target).map_err(|err| RequestError::InvalidUrl(err.to_string()))?;
        Self::from_url(url, options)
    }

    pub fn from_url(target: Url, options: FetchOptions) -> Result<Self, RequestError> {
        if !matches!(target.scheme(), "http" | "https") {
            return Err(RequestError::UnsupportedScheme(target.scheme().to_string()));
        }
        if options.execution_budget.is_zero() {
            return Err(RequestError::ZeroBudget);
        }
        if options.word_limit == 0 {
            return Err(RequestError::ZeroWordLimit);
        }
        Ok(Self { target, options })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn execution_budget(&self) -> Duration {
        self.options.execution_budget
    }

    pub fn filter_markup(&self) -> bool {
        self.options.filter_markup
    }

    pub fn word_limit(&self) -> usize {
        self.options.word_limit
    }
}
