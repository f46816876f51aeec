use std::time::Duration;

use pretty_assertions::assert_eq;
use relay_core::{scan_directives, Directive, DEFAULT_DIRECTIVE_BUDGET};

#[test]
fn parses_full_directive() {
    let raw = "[include-url: http://example.test/a max_execution_time:1000 filter:true store:false]";
    let directive = Directive::parse(raw).expect("valid directive");
    assert_eq!(directive.url.as_str(), "http://example.test/a");
    assert_eq!(directive.execution_budget, Duration::from_millis(1000));
    assert!(directive.filter_markup);
    assert!(!directive.store);
    assert_eq!(directive.raw, raw);
}

#[test]
fn omitted_parameters_use_defaults() {
    let directive = Directive::parse("[include-url: https://example.test]").unwrap();
    assert_eq!(directive.execution_budget, DEFAULT_DIRECTIVE_BUDGET);
    assert!(!directive.filter_markup);
    assert!(!directive.store);
}

#[test]
fn parameters_may_appear_in_any_order() {
    let directive =
        Directive::parse("[include-url: https://example.test store:true filter:false]").unwrap();
    assert!(directive.store);
    assert!(!directive.filter_markup);
}

#[test]
fn rejects_malformed_parameters() {
    for raw in [
        "[include-url: not a url]",
        "[include-url: https://example.test filter:yes]",
        "[include-url: https://example.test max_execution_time:0]",
        "[include-url: https://example.test max_execution_time:-5]",
        "[include-url: https://example.test color:red]",
        "[include-url: https://example.test store:true store:false]",
        "[include-url: ]",
    ] {
        assert_eq!(Directive::parse(raw), None, "{raw} should not parse");
    }
}

#[test]
fn scan_finds_directives_left_to_right() {
    let text = "see [include-url: http://a.test] and [include-url: http://b.test filter:true] done";
    let found = scan_directives(text);
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].directive.url.as_str(), "http://a.test/");
    assert_eq!(&text[found[0].range.clone()], "[include-url: http://a.test]");
    assert_eq!(found[1].directive.url.as_str(), "http://b.test/");
    assert!(found[1].range.start > found[0].range.end);
}

#[test]
fn invalid_spans_are_skipped_but_later_ones_are_found() {
    let text = "[include-url: bogus filter:maybe] then [include-url: http://ok.test]";
    let found = scan_directives(text);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].directive.url.as_str(), "http://ok.test/");
}

#[test]
fn unclosed_opening_does_not_hide_a_later_directive() {
    let text = "draft [include-url: todo then [include-url: http://ok.test filter:true]";
    let found = scan_directives(text);
    assert_eq!(found.len(), 1);
    assert_eq!(
        &text[found[0].range.clone()],
        "[include-url: http://ok.test filter:true]"
    );
    assert!(found[0].directive.filter_markup);
}

#[test]
fn text_without_directives_yields_nothing() {
    assert!(scan_directives("plain [text] with [include-url: unterminated").is_empty());
    assert!(scan_directives("[include-url:]").is_empty());
}

#[test]
fn directive_builds_a_fetch_request() {
    let directive =
        Directive::parse("[include-url: http://example.test max_execution_time:2500 filter:true]")
            .unwrap();
    let request = directive.fetch_request(50).unwrap();
    assert_eq!(request.execution_budget(), Duration::from_millis(2500));
    assert!(request.filter_markup());
    assert_eq!(request.word_limit(), 50);
}

#[test]
fn non_http_directive_is_rejected_at_request_time() {
    let directive = Directive::parse("[include-url: ftp://example.test/file]").unwrap();
    assert!(directive.fetch_request(10).is_err());
}
