//! Stripping of model reasoning spans from generated text.
//!
//! Local models often wrap chain-of-thought in `<think>…</think>`-style
//! tags. Callers persist and display only the remainder.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a complete reasoning span, including the tags. `(?is)` makes the
/// match case-insensitive and lets `.` cross newlines.
static REASONING_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(think|thinking|reasoning)>.*?</(think|thinking|reasoning)>").unwrap()
});

/// Matches an unterminated reasoning span at any point in the text (a model
/// cut off mid-thought); everything from the opening tag onward is dropped.
static OPEN_REASONING_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(think|thinking|reasoning)>.*\z").unwrap());

/// Remove reasoning-tagged spans from `text` and trim the remainder.
pub fn strip_reasoning_tags(text: &str) -> String {
    let without_spans = REASONING_SPAN.replace_all(text, "");
    let without_tail = OPEN_REASONING_TAIL.replace(&without_spans, "");
    without_tail.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_think_block() {
        assert_eq!(
            strip_reasoning_tags("<think>hidden</think>\n\nvisible"),
            "visible"
        );
    }

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(strip_reasoning_tags("  hello world "), "hello world");
    }

    #[test]
    fn strips_multiple_spans_and_aliases() {
        let input = "<reasoning>a</reasoning>one <thinking>b</thinking>two";
        assert_eq!(strip_reasoning_tags(input), "one two");
    }

    #[test]
    fn drops_unterminated_span() {
        assert_eq!(strip_reasoning_tags("answer<think>never closed"), "answer");
    }

    #[test]
    fn fully_hidden_reply_becomes_empty() {
        assert_eq!(strip_reasoning_tags("<think>only thoughts</think>"), "");
    }
}
