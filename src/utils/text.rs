/// Cuts `text` to at most `max_chars` characters, appending `...` when
/// anything was dropped. Never splits a UTF-8 sequence.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", &text[..cut]),
    }
}

#[cfg(test)]
mod tests {
    use super::preview;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(preview("abc", 5), "abc");
        assert_eq!(preview("abcde", 5), "abcde");
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("żółwik", 2), "żó...");
    }
}
