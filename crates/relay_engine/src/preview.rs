/// Characters of stored content echoed to the log.
pub const STORE_PREVIEW_CHARS: usize = 60;

/// First `max_chars` characters of `text`, never splitting a character.
pub fn text_preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::text_preview;

    #[test]
    fn short_text_kept_as_is() {
        assert_eq!(text_preview("short", 60), "short");
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        let text = "é".repeat(80);
        let preview = text_preview(&text, 60);
        assert_eq!(preview.chars().count(), 60);
        assert!(text.starts_with(preview));
    }
}
