use pretty_assertions::assert_eq;
use relay_engine::{decode_body, BodyTextExtractor, TextExtractor, TRUNCATION_MARKER};

const PAGE: &str = r#"
<html>
  <head><title>Ignored title</title><style>head { color: red }</style></head>
  <body>
    <h1>Heading</h1>
    <script>var secret = "leak";</script>
    <p>Some
       body     text</p>
    <style>.x { display: none }</style>
  </body>
</html>
"#;

#[test]
fn filtered_extraction_drops_script_and_style() {
    let extracted = BodyTextExtractor.extract(PAGE, true, 100);
    assert_eq!(extracted.text, "Heading Some body text");
    assert!(!extracted.truncated);
    assert_eq!(extracted.original_length, extracted.text.chars().count());
}

#[test]
fn unfiltered_extraction_keeps_script_text_but_not_head() {
    let extracted = BodyTextExtractor.extract(PAGE, false, 100);
    assert!(extracted.text.contains("secret"));
    assert!(extracted.text.contains("display: none"));
    assert!(!extracted.text.contains("Ignored title"));
}

#[test]
fn script_content_never_leaks_when_filtered() {
    for payload in ["alert(1)", "</p>tricky", "document.write('<b>x</b>')", "    "] {
        let html = format!("<body><p>visible</p><script>{payload}</script></body>");
        let extracted = BodyTextExtractor.extract(&html, true, 100);
        assert_eq!(extracted.text, "visible", "payload {payload:?}");
    }
}

#[test]
fn word_limit_truncates_with_single_marker() {
    let words: Vec<String> = (0..50).map(|i| format!("w{i}")).collect();
    let html = format!("<body><p>{}</p></body>", words.join("\n  "));

    for limit in [1, 10, 49, 50, 51, 200] {
        let extracted = BodyTextExtractor.extract(&html, true, limit);
        let exceeded = words.len() > limit;
        assert_eq!(extracted.truncated, exceeded, "limit {limit}");
        assert_eq!(
            extracted.text.matches(TRUNCATION_MARKER).count(),
            usize::from(exceeded),
            "limit {limit}"
        );
        let body = extracted
            .text
            .strip_suffix(TRUNCATION_MARKER)
            .unwrap_or(&extracted.text);
        let kept: Vec<&str> = body.split(' ').collect();
        assert!(kept.len() <= limit);
        assert_eq!(kept, words[..kept.len()].iter().map(String::as_str).collect::<Vec<_>>());
    }
}

#[test]
fn empty_body_extracts_to_empty_text() {
    let extracted = BodyTextExtractor.extract("<html><head></head><body>  \n </body></html>", true, 5);
    assert_eq!(extracted.text, "");
    assert_eq!(extracted.original_length, 0);
}

#[test]
fn extraction_is_deterministic() {
    let first = BodyTextExtractor.extract(PAGE, true, 3);
    let second = BodyTextExtractor.extract(PAGE, true, 3);
    assert_eq!(first, second);
    assert_eq!(first.text, "Heading Some body...");
}

#[test]
fn decode_respects_charset_header() {
    let decoded = decode_body(b"caf\xe9", Some("text/html; charset=ISO-8859-1"));
    assert_eq!(decoded.text, "caf\u{e9}");
    assert!(!decoded.had_errors);
}

#[test]
fn decode_handles_utf8_bom() {
    let decoded = decode_body(b"\xEF\xBB\xBFhello", Some("text/html"));
    assert_eq!(decoded.text, "hello");
    assert_eq!(decoded.encoding_label, "UTF-8");
}

#[test]
fn decode_replaces_malformed_sequences() {
    let decoded = decode_body(b"ok \xff\xfe bad", Some("text/plain; charset=utf-8"));
    assert!(decoded.had_errors);
    assert!(decoded.text.starts_with("ok "));
}
