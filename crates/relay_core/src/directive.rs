use std::ops::Range;
use std::time::Duration;

use url::Url;

use crate::request::{FetchOptions, FetchRequest, RequestError};

/// Budget used when a directive omits `max_execution_time`.
pub const DEFAULT_DIRECTIVE_BUDGET: Duration = Duration::from_millis(300_000);

const OPEN: &str = "[include-url:";
const CLOSE: char = ']';

/// A parsed `[include-url: ...]` command embedded in user text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub raw: String,
    pub url: Url,
    pub execution_budget: Duration,
    pub filter_markup: bool,
    pub store: bool,
}

/// A directive together with its byte range in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveMatch {
    pub range: Range<usize>,
    pub directive: Directive,
}

impl Directive {
    /// Parse a complete `[include-url: ...]` span. Returns `None` for text
    /// that does not follow the grammar.
    pub fn parse(raw: &str) -> Option<Self> {
        let inner = raw.strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
        if inner.contains(CLOSE) {
            return None;
        }

        let mut parts = inner.split_whitespace();
        let url = Url::parse(parts.next()?).ok()?;

        let mut budget = None;
        let mut filter = None;
        let mut store = None;
        for part in parts {
            let (key, value) = part.split_once(':')?;
            match key {
                "max_execution_time" if budget.is_none() => {
                    let millis: u64 = value.parse().ok().filter(|ms| *ms > 0)?;
                    budget = Some(Duration::from_millis(millis));
                }
                "filter" if filter.is_none() => filter = Some(parse_bool(value)?),
                "store" if store.is_none() => store = Some(parse_bool(value)?),
                _ => return None,
            }
        }

        Some(Self {
            raw: raw.to_string(),
            url,
            execution_budget: budget.unwrap_or(DEFAULT_DIRECTIVE_BUDGET),
            filter_markup: filter.unwrap_or(false),
            store: store.unwrap_or(false),
        })
    }

    pub fn fetch_request(&self, word_limit: usize) -> Result<FetchRequest, RequestError> {
        FetchRequest::from_url(
            self.url.clone(),
            FetchOptions {
                execution_budget: self.execution_budget,
                filter_markup: self.filter_markup,
                word_limit,
            },
        )
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Find every well-formed directive in `text`, left to right, non-overlapping.
///
/// A span that looks like a directive but does not parse stays literal text;
/// scanning resumes right after its opening marker so a later directive that
/// shares the same closing bracket is still found.
pub fn scan_directives(text: &str) -> Vec<DirectiveMatch> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find(OPEN) {
        let start = cursor + offset;
        let body_start = start + OPEN.len();
        let Some(close) = text[body_start..].find(CLOSE) else {
            break;
        };
        if close == 0 {
            cursor = body_start;
            continue;
        }
        let end = body_start + close + CLOSE.len_utf8();
        match Directive::parse(&text[start..end]) {
            Some(directive) => {
                found.push(DirectiveMatch {
                    range: start..end,
                    directive,
                });
                cursor = end;
            }
            None => cursor = body_start,
        }
    }
    found
}
