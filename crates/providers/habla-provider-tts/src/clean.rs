//! Discord markup removal
//!
//! Strips everything a synthesizer would read out loud badly: mentions,
//! custom emoji tags, code blocks, basic markdown and bare URLs. Applied
//! before synthesis; the normalizer in `habla-core` runs earlier, on the
//! raw chat text.

use once_cell::sync::Lazy;
use regex::Regex;

static USER_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@[!&]?\d+>").unwrap());
static CHANNEL_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<#\d+>").unwrap());
static CUSTOM_EMOJI: Lazy<Regex> = Lazy::new(|| Regex::new(r"<a?:\w+:\d+>").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]*`").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static UNDERLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.*?)__").unwrap());
static STRIKETHROUGH: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~(.*?)~~").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());

/// Strip Discord markup, collapse whitespace and cap the length at
/// `max_len` characters (an ellipsis is appended when truncating).
pub fn clean_text(text: &str, max_len: usize) -> String {
    let mut s = USER_MENTION.replace_all(text, "").into_owned();
    s = CHANNEL_MENTION.replace_all(&s, "").into_owned();
    s = CUSTOM_EMOJI.replace_all(&s, "").into_owned();
    s = CODE_FENCE.replace_all(&s, "").into_owned();
    s = INLINE_CODE.replace_all(&s, "").into_owned();
    s = BOLD.replace_all(&s, "$1").into_owned();
    s = UNDERLINE.replace_all(&s, "$1").into_owned();
    s = STRIKETHROUGH.replace_all(&s, "$1").into_owned();
    s = ITALIC.replace_all(&s, "$1").into_owned();
    s = URL.replace_all(&s, "").into_owned();

    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > max_len {
        let truncated: String = collapsed.chars().take(max_len).collect();
        format!("{truncated}...")
    } else {
        collapsed
    }
}
