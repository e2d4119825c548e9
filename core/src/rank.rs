use crate::search::GrepMatch;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Score at or above which a match is considered a "strong" definition site.
pub const STRONG_DEFINITION_SCORE: i32 = 60;

// Primitive/return-type tokens that make a `name(` line look like a function
// definition rather than a call. Includes the common kernel typedefs.
static PRIMITIVE_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "void", "bool", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
        "wchar_t", "char8_t", "char16_t", "char32_t", "size_t", "ssize_t", "int8_t", "uint8_t",
        "int16_t", "uint16_t", "int32_t", "uint32_t", "int64_t", "uint64_t", "intptr_t",
        "uintptr_t", "u8", "u16", "u32", "u64", "s8", "s16", "s32", "s64",
    ]
    .into_iter()
    .collect()
});

/// A grep match carrying its declaration-shape score and absolutized path.
#[derive(Clone, Debug)]
pub struct RankedMatch {
    pub hit: GrepMatch,
    pub score: i32,
    pub abs_path: String,
}

fn is_ws_or_bol_before(bytes: &[u8], col0: usize) -> bool {
    if col0 == 0 {
        return true;
    }
    matches!(bytes[col0 - 1], b' ' | b'\t')
}

fn prev_non_space(bytes: &[u8], before: usize) -> u8 {
    let mut k = before.min(bytes.len());
    while k > 0 {
        let c = bytes[k - 1];
        if c != b' ' && c != b'\t' {
            return c;
        }
        k -= 1;
    }
    0
}

// Walk left from `before`: skip whitespace, then type punctuation, then
// collect the identifier, lowercased.
fn prev_identifier(bytes: &[u8], before: usize) -> String {
    let mut k = before.min(bytes.len());
    while k > 0 && matches!(bytes[k - 1], b' ' | b'\t') {
        k -= 1;
    }
    while k > 0 {
        match bytes[k - 1] {
            b'*' | b'&' | b':' | b'<' | b'>' | b',' | b'(' => k -= 1,
            _ => break,
        }
    }
    while k > 0 && matches!(bytes[k - 1], b' ' | b'\t') {
        k -= 1;
    }
    let end = k;
    while k > 0 && (bytes[k - 1].is_ascii_alphanumeric() || bytes[k - 1] == b'_') {
        k -= 1;
    }
    bytes[k..end]
        .iter()
        .map(|b| b.to_ascii_lowercase() as char)
        .collect()
}

// Column of the macro name on a `#define` line, if this is one.
fn macro_name_start_if_define(bytes: &[u8]) -> Option<usize> {
    const DEFINE: &[u8] = b"define";
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'#' {
        return None;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i + DEFINE.len() > bytes.len() || &bytes[i..i + DEFINE.len()] != DEFINE {
        return None;
    }
    i += DEFINE.len();
    if i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        return None;
    }
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }
    Some(i)
}

/// Additive declaration-shape score for a match line. Larger means the line
/// looks more like the needle's declaration or definition site; the values
/// only encode ordinal preference.
pub fn score_match_line(line: &str, col0: usize, needle: &str) -> i32 {
    let bytes = line.as_bytes();
    let mut score = 0;

    // Strong signal: macro definition with the needle as the macro name.
    if macro_name_start_if_define(bytes) == Some(col0) {
        score += 100;
    }

    // Token boundary before the needle hints at a declaration site.
    if is_ws_or_bol_before(bytes, col0) {
        score += 25;
    }

    // Template-ish or qualified type before it, e.g. `vector<T> foo(...)`.
    if prev_non_space(bytes, col0) == b'>' {
        score += 20;
    }

    let end = (col0 + needle.len()).min(bytes.len());

    // `int foo;` style declaration.
    if end < bytes.len() && bytes[end] == b';' {
        score += 40;
    }

    // Function-like: decl, def, or call all count, so this stays moderate.
    let mut j = end;
    while j < bytes.len() && matches!(bytes[j], b' ' | b'\t') {
        j += 1;
    }
    if j < bytes.len() && bytes[j] == b'(' {
        score += 60;
        let prev = prev_identifier(bytes, col0);
        if !prev.is_empty() && PRIMITIVE_TYPES.contains(prev.as_str()) {
            score += 30;
        }
    }

    score
}

/// Absolutizes paths, drops the match on the cursor's own line, applies the
/// preferred-file bonus, and stably orders best-first by
/// `(-score, abs_path, line, column)`.
pub fn rank_matches(
    matches: Vec<GrepMatch>,
    needle: &str,
    current_abs_path: &str,
    current_line1: u32,
    prefer_abs_path: &str,
    make_abs: impl Fn(&str) -> String,
) -> Vec<RankedMatch> {
    let mut out = Vec::with_capacity(matches.len());
    for hit in matches {
        let abs_path = make_abs(&hit.path);
        if !current_abs_path.is_empty()
            && current_line1 > 0
            && abs_path == current_abs_path
            && hit.line == current_line1
        {
            // The user is already on this line.
            continue;
        }
        let mut score = score_match_line(&hit.text, hit.column as usize, needle);
        // Same-file matches are handy for references, but must not outrank
        // real definition-shaped lines elsewhere.
        if !prefer_abs_path.is_empty() && abs_path == prefer_abs_path {
            score += 10;
        }
        out.push(RankedMatch {
            hit,
            score,
            abs_path,
        });
    }
    out.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.abs_path.cmp(&b.abs_path))
            .then_with(|| a.hit.line.cmp(&b.hit.line))
            .then_with(|| a.hit.column.cmp(&b.hit.column))
    });
    out
}
