use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{Html, Selector};

/// Appended when the word limit cut the text short.
pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    /// Character count of the normalized text before the word limit applied.
    pub original_length: usize,
    pub truncated: bool,
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, html: &str, filter_markup: bool, word_limit: usize) -> ExtractedText;
}

/// Plain-text extractor over the document `<body>`:
/// - optionally drops `<script>` and `<style>` subtrees
/// - collapses every whitespace run to one space and trims
/// - keeps at most `word_limit` words, marking the cut with `...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BodyTextExtractor;

impl TextExtractor for BodyTextExtractor {
    fn extract(&self, html: &str, filter_markup: bool, word_limit: usize) -> ExtractedText {
        let doc = Html::parse_document(html);
        let body_sel = Selector::parse("body").ok();

        let mut raw = String::new();
        if let Some(body) = body_sel.as_ref().and_then(|sel| doc.select(sel).next()) {
            collect_text(*body, filter_markup, &mut raw);
        }

        let words: Vec<&str> = raw.split_whitespace().collect();
        let normalized = words.join(" ");
        let original_length = normalized.chars().count();

        if words.len() > word_limit {
            let kept = words[..word_limit].join(" ");
            ExtractedText {
                text: format!("{kept}{TRUNCATION_MARKER}"),
                original_length,
                truncated: true,
            }
        } else {
            ExtractedText {
                text: normalized,
                original_length,
                truncated: false,
            }
        }
    }
}

fn collect_text(node: NodeRef<'_, Node>, filter_markup: bool, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(text),
        Node::Comment(_) => {}
        Node::Element(element)
            if filter_markup && matches!(element.name(), "script" | "style") => {}
        _ => {
            for child in node.children() {
                collect_text(child, filter_markup, out);
            }
        }
    }
}
