use std::sync::OnceLock;

use regex::Regex;

fn sentence_gap() -> &'static Regex {
    static GAP: OnceLock<Regex> = OnceLock::new();
    GAP.get_or_init(|| Regex::new(r"\.\s{2,}").expect("static sentence gap pattern"))
}

/// A period followed by two or more whitespace characters becomes a paragraph
/// break. Applied to partial buffers after every token; reapplying it is a no-op.
pub fn paragraph_breaks(text: &str) -> String {
    sentence_gap().replace_all(text, ".\n\n").into_owned()
}

/// Appends `token` to `buffer` and renormalizes in place.
pub fn push_token(buffer: &mut String, token: &str) {
    buffer.push_str(token);
    if sentence_gap().is_match(buffer) {
        *buffer = paragraph_breaks(buffer);
    }
}
