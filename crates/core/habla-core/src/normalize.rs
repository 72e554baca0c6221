//! Chat-slang normalizer
//!
//! Rewrites a fixed set of slang tokens into forms the speech synthesizer
//! pronounces sensibly. Rules are ordered and applied sequentially, so the
//! output of one rule is visible to the next. Matching is case-insensitive
//! and tolerates whitespace spread between the characters of a token
//! ("x d" still reads as "xd"), but never fires inside a larger word.

use once_cell::sync::Lazy;
use regex::Regex;

/// Substitution rules in application order. `wtf?` must run before `wtf`
/// so the question mark is preserved in the replacement.
const RULES: &[(&str, &str)] = &[
    ("xd", "X D"),
    ("wtf?", "watafac?"),
    ("wtf", "watafac"),
    ("omg", "o-em-ge"),
    ("porno", "nopor"),
    ("hitler", "señor del bigote"),
];

static COMPILED: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|(token, replacement)| {
            let re = Regex::new(&flexible_pattern(token))
                .unwrap_or_else(|e| panic!("invalid normalizer rule {token:?}: {e}"));
            (re, *replacement)
        })
        .collect()
});

/// Build a case-insensitive pattern that allows whitespace between the
/// characters of `token`.
fn flexible_pattern(token: &str) -> String {
    let mut inner = String::new();
    for ch in token.chars() {
        if ch.is_whitespace() {
            continue;
        }
        if !inner.is_empty() {
            inner.push_str(r"\s*");
        }
        inner.push_str(&regex::escape(&ch.to_string()));
    }
    format!("(?i){inner}")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Replace matches of `re` in `text`, skipping matches glued to word
/// characters on either side. The `regex` crate has no lookaround, so the
/// boundary check happens here instead of in the pattern.
fn apply_rule(text: &str, re: &Regex, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        let before_ok = text[..m.start()]
            .chars()
            .next_back()
            .is_none_or(|c| !is_word_char(c));
        let after_ok = text[m.end()..]
            .chars()
            .next()
            .is_none_or(|c| !is_word_char(c));
        if before_ok && after_ok {
            out.push_str(&text[last..m.start()]);
            out.push_str(replacement);
            last = m.end();
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Normalize chat text for speech. Pure and total; unknown text passes
/// through unchanged.
pub fn normalize(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in COMPILED.iter() {
        result = apply_rule(&result, re, replacement);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_basic_substitutions() {
        assert_eq!(normalize("xd"), "X D");
        assert_eq!(normalize("omg"), "o-em-ge");
        assert_eq!(normalize("porno"), "nopor");
        assert_eq!(normalize("hitler"), "señor del bigote");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(normalize("XD"), "X D");
        assert_eq!(normalize("Omg que risa"), "o-em-ge que risa");
    }

    #[test]
    fn test_spaced_token_matches() {
        assert_eq!(normalize("x d"), "X D");
        assert_eq!(normalize("w t f"), "watafac");
    }

    #[test]
    fn test_wtf_question_mark_ordering() {
        assert_eq!(normalize("wtf?"), "watafac?");
        assert_eq!(normalize("wtf"), "watafac");
        assert_eq!(normalize("wtf? wtf"), "watafac? watafac");
    }

    #[test]
    fn test_word_boundaries() {
        // Inside larger words nothing fires
        assert_eq!(normalize("expandido"), "expandido");
        assert_eq!(normalize("omgosh"), "omgosh");
        assert_eq!(normalize("xdd"), "xdd");
    }

    #[test]
    fn test_punctuation_is_a_boundary() {
        assert_eq!(normalize("jaja xd!"), "jaja X D!");
        assert_eq!(normalize("(omg)"), "(o-em-ge)");
    }

    #[test]
    fn test_multiple_occurrences() {
        assert_eq!(normalize("xd xd xd"), "X D X D X D");
    }

    #[test]
    fn test_normalized_text_is_stable() {
        let once = normalize("omg wtf xd");
        assert_eq!(normalize(&once), once);
    }
}
