//! Text normalisation fed to the external calendar classifier. The stored
//! `Message::text` / `ClassifiedMessage::text` is never touched — only the
//! copy handed to the classifier is cleaned (spec §4.2).

use std::sync::OnceLock;

use regex::Regex;

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+").unwrap())
}

fn mention_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@\w+").unwrap())
}

fn channel_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\w+").unwrap())
}

fn special_chars_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s.,!?]").unwrap())
}

/// Lowercase, collapse URLs/mentions/channel-mentions to placeholder
/// tokens, strip anything that isn't word/space/basic-punctuation.
///
/// Idempotent: `clean_text(clean_text(s)) == clean_text(s)` — every
/// placeholder token (`link`, `user`, `group`) and the stripped character
/// class are themselves fixed points of a second pass.
pub fn clean_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_urls = url_pattern().replace_all(lowered.trim(), "link");
    let no_channels = channel_pattern().replace_all(&no_urls, "group");
    let no_mentions = mention_pattern().replace_all(&no_channels, "user");
    special_chars_pattern()
        .replace_all(&no_mentions, "")
        .into_owned()
}
