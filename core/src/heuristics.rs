use once_cell::sync::Lazy;
use std::collections::HashSet;

// Very common C/C++ keywords that should never trigger a workspace grep.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "alignas",
        "alignof",
        "asm",
        "auto",
        "bool",
        "break",
        "case",
        "catch",
        "char",
        "char8_t",
        "char16_t",
        "char32_t",
        "class",
        "concept",
        "const",
        "consteval",
        "constexpr",
        "constinit",
        "continue",
        "co_await",
        "co_return",
        "co_yield",
        "decltype",
        "default",
        "delete",
        "do",
        "double",
        "dynamic_cast",
        "else",
        "enum",
        "explicit",
        "export",
        "extern",
        "false",
        "float",
        "for",
        "friend",
        "goto",
        "if",
        "inline",
        "int",
        "long",
        "mutable",
        "namespace",
        "new",
        "noexcept",
        "nullptr",
        "operator",
        "private",
        "protected",
        "public",
        "register",
        "reinterpret_cast",
        "requires",
        "return",
        "short",
        "signed",
        "sizeof",
        "static",
        "static_assert",
        "static_cast",
        "struct",
        "switch",
        "template",
        "this",
        "thread_local",
        "throw",
        "true",
        "try",
        "typedef",
        "typeid",
        "typename",
        "union",
        "unsigned",
        "using",
        "virtual",
        "void",
        "volatile",
        "wchar_t",
        "while",
    ]
    .into_iter()
    .collect()
});

pub(crate) fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

// A quote is escaped iff it is preceded by an odd run of backslashes.
pub(crate) fn is_escaped_quote(line: &[u8], pos: usize) -> bool {
    let mut backslashes = 0;
    let mut i = pos;
    while i > 0 && line[i - 1] == b'\\' {
        backslashes += 1;
        i -= 1;
    }
    backslashes % 2 == 1
}

fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Byte column of the first occurrence of `needle` that looks like code:
/// not on a comment-only line, not inside a double-quoted string literal.
/// `None` rejects the whole line.
///
/// Deliberately lightweight: `/* */` blocks, raw strings, and character
/// literals are not parsed.
pub fn find_column0(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    let bytes = haystack.as_bytes();

    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i + 1 < bytes.len() && bytes[i] == b'/' && bytes[i + 1] == b'/' {
        return None;
    }

    let mut search_from = 0;
    while let Some(pos) = find_bytes(bytes, needle.as_bytes(), search_from) {
        let mut in_string = false;
        for j in 0..pos {
            if bytes[j] == b'"' && !is_escaped_quote(bytes, j) {
                in_string = !in_string;
            }
        }
        if !in_string {
            return Some(pos);
        }
        search_from = pos + 1;
    }
    None
}

/// Maximal `[A-Za-z0-9_]` run covering the cursor. The column is clamped to
/// the line length, and a cursor sitting at end-of-line or one past the last
/// byte of a word backs up one column so the adjacent word still resolves.
pub fn word_at(text: &str, line0: usize, ch0: usize) -> Option<String> {
    let line = text.split('\n').nth(line0)?;
    let bytes = line.as_bytes();

    let mut cursor = ch0.min(bytes.len());
    if cursor > 0 && cursor == bytes.len() {
        cursor -= 1;
    }
    if cursor > 0
        && cursor < bytes.len()
        && !is_word_byte(bytes[cursor])
        && is_word_byte(bytes[cursor - 1])
    {
        cursor -= 1;
    }

    let mut start = cursor;
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = cursor;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    if end <= start {
        return None;
    }
    Some(line[start..end].to_string())
}

/// Whether the cursor column sits at or after a `//` pair that is outside of
/// any double-quoted string on its line.
pub fn cursor_in_line_comment(text: &str, line0: usize, ch0: usize) -> bool {
    let Some(line) = text.split('\n').nth(line0) else {
        return false;
    };
    let bytes = line.as_bytes();
    let col = ch0.min(bytes.len());

    let mut in_string = false;
    let mut j = 0;
    while j + 1 < bytes.len() {
        if bytes[j] == b'"' && !is_escaped_quote(bytes, j) {
            in_string = !in_string;
        }
        if !in_string && bytes[j] == b'/' && bytes[j + 1] == b'/' {
            return col >= j;
        }
        j += 1;
    }
    false
}

/// Rejects tokens too common to be worth a grep. Empty counts as a stop word.
pub fn is_stop_word(symbol: &str) -> bool {
    if symbol.is_empty() {
        return true;
    }
    STOP_WORDS.contains(symbol.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn comment_only_line_is_rejected() {
        assert_eq!(find_column0("  // FOO is fine", "FOO"), None);
        assert_eq!(find_column0("\t//FOO", "FOO"), None);
    }

    #[test]
    fn trailing_comment_does_not_reject_code_before_it() {
        assert_eq!(find_column0("int FOO = 1; // FOO", "FOO"), Some(4));
    }

    #[test]
    fn match_only_inside_string_is_rejected() {
        assert_eq!(find_column0("const char* s = \"FOO\";", "FOO"), None);
    }

    #[test]
    fn first_code_occurrence_wins_over_string_occurrence() {
        let line = "x = \"FOO\"; y = FOO;";
        assert_eq!(find_column0(line, "FOO"), Some(15));
    }

    #[test]
    fn escaped_quote_keeps_string_open() {
        // The \" does not close the literal, so FOO stays inside it.
        assert_eq!(find_column0("s = \"ab\\\"cd FOO\";", "FOO"), None);
    }

    #[test]
    fn escaped_backslash_before_quote_closes_string() {
        // "ab\\" is a complete literal; FOO afterwards is code.
        let line = "s = \"ab\\\\\"; int FOO;";
        assert_eq!(find_column0(line, "FOO"), Some(16));
    }

    #[test]
    fn empty_needle_resolves_to_column_zero() {
        assert_eq!(find_column0("anything", ""), Some(0));
    }

    #[test]
    fn word_at_middle_of_word() {
        assert_eq!(word_at("int compute_sum = 0;", 0, 6), Some("compute_sum".to_string()));
    }

    #[test]
    fn word_at_cursor_one_past_word_end() {
        //            0123456789
        let text = "foo(bar)";
        assert_eq!(word_at(text, 0, 3), Some("foo".to_string()));
        assert_eq!(word_at(text, 0, 7), Some("bar".to_string()));
    }

    #[test]
    fn word_at_end_of_line_backs_up() {
        assert_eq!(word_at("return value", 0, 12), Some("value".to_string()));
        assert_eq!(word_at("return value", 0, 99), Some("value".to_string()));
    }

    #[test]
    fn word_at_selects_requested_line() {
        let text = "alpha\nbeta gamma\ndelta";
        assert_eq!(word_at(text, 1, 5), Some("beta".to_string()));
        assert_eq!(word_at(text, 2, 0), Some("delta".to_string()));
        assert_eq!(word_at(text, 9, 0), None);
    }

    #[test]
    fn word_at_nothing_adjacent() {
        assert_eq!(word_at("a + b", 0, 2), None);
        assert_eq!(word_at("", 0, 0), None);
    }

    #[test]
    fn word_at_yields_only_word_characters() {
        let text = "ptr->field_9 + 1";
        let word = word_at(text, 0, 8).unwrap();
        assert!(word.bytes().all(is_word_byte));
        assert_eq!(word, "field_9");
    }

    #[test]
    fn cursor_in_line_comment_detection() {
        let text = "int x = 1; // trailing note";
        assert!(cursor_in_line_comment(text, 0, 14));
        assert!(cursor_in_line_comment(text, 0, 11));
        assert!(!cursor_in_line_comment(text, 0, 4));
    }

    #[test]
    fn slashes_inside_strings_are_not_comments() {
        let text = "url = \"http://example\"; x";
        assert!(!cursor_in_line_comment(text, 0, 24));
    }

    #[test]
    fn stop_words_are_case_insensitive() {
        assert!(is_stop_word("int"));
        assert!(is_stop_word("Int"));
        assert!(is_stop_word("co_await"));
        assert!(is_stop_word(""));
        assert!(!is_stop_word("compute"));
        assert!(!is_stop_word("intptr"));
    }
}
